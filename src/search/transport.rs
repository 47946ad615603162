//! Wire seam between the search client and a concrete engine.

use crate::error::Result;
use serde_json::Value;

/// Raw engine answer: HTTP status plus the decoded JSON body (`Null` when
/// the body was empty).
#[derive(Clone, Debug, PartialEq)]
pub struct EngineResponse {
    pub status: u16,
    pub body: Value,
}

impl EngineResponse {
    pub fn new(status: u16, body: Value) -> Self {
        EngineResponse { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// `error.type` of an engine fault, e.g. `resource_already_exists_exception`.
    pub fn error_type(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str)
    }
}

/// Engine operations used by [`SearchIndexClient`](super::SearchIndexClient).
///
/// `Err` means the request never produced a response (connection refused,
/// timeout, TLS failure) and is worth retrying. Any HTTP answer, including
/// 4xx and 5xx, is `Ok` and interpreted by the client.
#[allow(async_fn_in_trait)]
pub trait SearchTransport: Send + Sync {
    async fn create_index(&self, index: &str, settings: &Value) -> Result<EngineResponse>;

    async fn delete_index(&self, index: &str) -> Result<EngineResponse>;

    async fn index_exists(&self, index: &str) -> Result<EngineResponse>;

    async fn refresh_index(&self, index: &str) -> Result<EngineResponse>;

    async fn index_document(&self, index: &str, id: &str, document: &Value)
        -> Result<EngineResponse>;

    /// Newline-delimited bulk body: one action line then one source line per
    /// document.
    async fn bulk(&self, index: &str, lines: &[Value]) -> Result<EngineResponse>;

    async fn update_document(&self, index: &str, id: &str, body: &Value)
        -> Result<EngineResponse>;

    async fn delete_document(&self, index: &str, id: &str) -> Result<EngineResponse>;

    async fn get_document(&self, index: &str, id: &str) -> Result<EngineResponse>;

    async fn search(&self, index: &str, query: &Value) -> Result<EngineResponse>;

    async fn count(&self, index: &str, query: &Value) -> Result<EngineResponse>;
}
