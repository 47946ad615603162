//! Search engine connection settings.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:9200";
pub const DEFAULT_INDEX: &str = "compliance";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the transport authenticates against the engine.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    Basic { username: String, password: String },
    ApiKey { id: String, key: String },
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::ApiKey { id, .. } => f
                .debug_struct("ApiKey")
                .field("id", id)
                .field("key", &"***")
                .finish(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    pub url: String,
    pub credentials: Credentials,
    /// Index used when callers do not name one.
    pub default_index: String,
    /// Pinned PEM certificate: the server's certificate must be this one or be
    /// signed by it, and the system roots are ignored. Hostnames are not
    /// checked in this mode. `None` validates against the system roots.
    pub ca_certificate: Option<PathBuf>,
    /// Log request and response bodies at `debug!`.
    pub debug: bool,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            url: DEFAULT_URL.to_string(),
            credentials: Credentials::None,
            default_index: DEFAULT_INDEX.to_string(),
            ca_certificate: None,
            debug: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SearchConfig {
    /// Defaults overridden by `SEARCH_URL`, `SEARCH_USERNAME`,
    /// `SEARCH_PASSWORD`, `SEARCH_API_KEY_ID`, `SEARCH_API_KEY`,
    /// `SEARCH_DEFAULT_INDEX`, `SEARCH_CA_CERT`, `SEARCH_DEBUG` and
    /// `SEARCH_TIMEOUT_SECS`.
    ///
    /// An API key takes precedence over a username/password pair.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SearchConfig::default();

        let credentials = match (
            var("SEARCH_API_KEY_ID"),
            var("SEARCH_API_KEY"),
            var("SEARCH_USERNAME"),
            var("SEARCH_PASSWORD"),
        ) {
            (Some(id), Some(key), _, _) => Credentials::ApiKey { id, key },
            (_, _, Some(username), Some(password)) => Credentials::Basic { username, password },
            _ => Credentials::None,
        };

        SearchConfig {
            url: var("SEARCH_URL").unwrap_or(defaults.url),
            credentials,
            default_index: var("SEARCH_DEFAULT_INDEX").unwrap_or(defaults.default_index),
            ca_certificate: var("SEARCH_CA_CERT").map(PathBuf::from),
            debug: var("SEARCH_DEBUG")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.debug),
            timeout: var("SEARCH_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn with_default_index(mut self, index: impl Into<String>) -> Self {
        self.default_index = index.into();
        self
    }

    /// # Errors
    ///
    /// `ConfigError` for a non-http(s) URL or an empty default index.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::ConfigError(format!(
                "search URL must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        if self.default_index.is_empty() {
            return Err(Error::ConfigError("default index is empty".to_string()));
        }
        Ok(())
    }
}
