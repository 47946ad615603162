//! Cache value codec: postcard inside a versioned envelope.
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│ VERSION (varint)│POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "CMPL"             u32 (varint)       DTO, DTO list or page
//! ```
//!
//! Entries whose magic or version do not match are rejected, and the read
//! path evicts them and reloads from the primary store.
//!
//! ```rust
//! use compliance_cache::serialization::{decode_entry, encode_entry};
//!
//! # fn main() -> compliance_cache::Result<()> {
//! let bytes = encode_entry(&vec!["ctl-1".to_string(), "ctl-2".to_string()])?;
//! assert_eq!(&bytes[0..4], b"CMPL");
//!
//! let ids: Vec<String> = decode_entry(&bytes)?;
//! assert_eq!(ids.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const CACHE_MAGIC: [u8; 4] = *b"CMPL";

/// Bump on any breaking change to a cached DTO shape. Old entries are then
/// evicted on first read instead of being misread.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    pub magic: [u8; 4],
    pub version: u32,
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value for storage in a cache backend.
pub fn encode_entry<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(&CacheEnvelope::new(value)).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a cache entry.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry` when the magic does not match
/// - `Error::VersionMismatch` when the schema version differs
/// - `Error::DeserializationError` when the payload is corrupt
pub fn decode_entry<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // header first, so a schema change is reported as such rather than as
    // a payload decoding failure
    let (magic, version) = read_header(bytes)?;

    if magic != CACHE_MAGIC {
        warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC, magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, magic
        )));
    }

    if version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: version,
        });
    }

    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        warn!("Cache payload decoding failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;
    Ok(envelope.payload)
}

#[derive(Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

fn read_header(bytes: &[u8]) -> Result<([u8; 4], u32)> {
    let (header, _rest): (Header, &[u8]) = postcard::take_from_bytes(bytes).map_err(|e| {
        Error::InvalidCacheEntry(format!("Unreadable cache entry header: {}", e))
    })?;
    Ok((header.magic, header.version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    struct MerchantDto {
        merchant_id: u64,
        name: String,
        controls: Vec<String>,
    }

    fn merchant() -> MerchantDto {
        MerchantDto {
            merchant_id: 42,
            name: "Acme Payments".to_string(),
            controls: vec!["ctl-1".to_string(), "ctl-2".to_string()],
        }
    }

    #[test]
    fn test_entry_round_trip() {
        let bytes = encode_entry(&merchant()).expect("encode");
        let decoded: MerchantDto = decode_entry(&bytes).expect("decode");
        assert_eq!(decoded, merchant());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode_entry(&merchant()).expect("encode");
        let b = encode_entry(&merchant()).expect("encode");
        assert_eq!(a, b);
    }

    #[test]
    fn test_envelope_header() {
        let bytes = encode_entry(&merchant()).expect("encode");
        assert_eq!(&bytes[0..4], b"CMPL");
        assert_eq!(bytes[4], CURRENT_SCHEMA_VERSION as u8);
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let mut bytes = encode_entry(&merchant()).expect("encode");
        bytes[0] = b'X';
        assert!(matches!(
            decode_entry::<MerchantDto>(&bytes),
            Err(Error::InvalidCacheEntry(_))
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let stale = CacheEnvelope {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION + 1,
            payload: merchant(),
        };
        let bytes = postcard::to_allocvec(&stale).expect("encode");

        match decode_entry::<MerchantDto>(&bytes) {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, CURRENT_SCHEMA_VERSION + 1);
            }
            other => panic!("expected version mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = encode_entry(&merchant()).expect("encode");
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            decode_entry::<MerchantDto>(truncated),
            Err(Error::DeserializationError(_))
        ));
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(matches!(
            decode_entry::<MerchantDto>(&[]),
            Err(Error::InvalidCacheEntry(_))
        ));
    }
}
