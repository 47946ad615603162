//! OpenSearch transport.

use super::config::{Credentials, SearchConfig};
use super::transport::{EngineResponse, SearchTransport};
use super::SearchIndexClient;
use crate::entity::IndexDocument;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use opensearch::auth::Credentials as AuthCredentials;
use opensearch::cert::{Certificate, CertificateValidation};
use opensearch::http::request::JsonBody;
use opensearch::http::response::Response;
use opensearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use opensearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesRefreshParts,
};
use opensearch::{
    BulkParts, CountParts, DeleteParts, GetParts, IndexParts, OpenSearch, SearchParts,
    UpdateParts,
};
use serde_json::Value;
use url::Url;

/// [`SearchTransport`] over the `opensearch` crate, single node.
#[derive(Clone)]
pub struct OpenSearchTransport {
    client: OpenSearch,
    debug: bool,
}

impl OpenSearchTransport {
    /// # Errors
    ///
    /// `ConfigError` for an invalid URL, an unreadable or invalid certificate,
    /// or a transport that cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        config.validate()?;

        let url = Url::parse(&config.url)
            .map_err(|e| Error::ConfigError(format!("invalid search URL '{}': {}", config.url, e)))?;

        let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(url))
            .timeout(config.timeout)
            .disable_proxy();

        match &config.credentials {
            Credentials::None => {}
            Credentials::Basic { username, password } => {
                builder = builder.auth(AuthCredentials::Basic(username.clone(), password.clone()));
            }
            Credentials::ApiKey { id, key } => {
                builder = builder.auth(AuthCredentials::ApiKey(id.clone(), key.clone()));
            }
        }

        if let Some(path) = &config.ca_certificate {
            let pem = std::fs::read(path).map_err(|e| {
                Error::ConfigError(format!("cannot read certificate {}: {}", path.display(), e))
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                Error::ConfigError(format!("invalid certificate {}: {}", path.display(), e))
            })?;
            // only this certificate is trusted; system roots are not consulted
            builder = builder.cert_validation(CertificateValidation::Certificate(certificate));
        }

        let transport = builder
            .build()
            .map_err(|e| Error::ConfigError(format!("search transport: {}", e)))?;

        info!(
            "OpenSearch transport created: {} (credentials {:?}, pinned certificate: {})",
            config.url,
            config.credentials,
            config.ca_certificate.is_some()
        );

        Ok(OpenSearchTransport {
            client: OpenSearch::new(transport),
            debug: config.debug,
        })
    }

    fn log_request(&self, operation: &str, index: &str, body: &Value) {
        if self.debug {
            debug!("OpenSearch {} on '{}' request: {}", operation, index, body);
        }
    }

    async fn read(&self, operation: &str, index: &str, response: Response) -> Result<EngineResponse> {
        let status = response.status_code().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
        };

        if self.debug {
            debug!(
                "OpenSearch {} on '{}' response ({}): {}",
                operation, index, status, body
            );
        }
        Ok(EngineResponse::new(status, body))
    }
}

impl SearchTransport for OpenSearchTransport {
    async fn create_index(&self, index: &str, settings: &Value) -> Result<EngineResponse> {
        self.log_request("create_index", index, settings);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(settings.clone())
            .send()
            .await?;
        self.read("create_index", index, response).await
    }

    async fn delete_index(&self, index: &str) -> Result<EngineResponse> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await?;
        self.read("delete_index", index, response).await
    }

    async fn index_exists(&self, index: &str) -> Result<EngineResponse> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await?;
        self.read("index_exists", index, response).await
    }

    async fn refresh_index(&self, index: &str) -> Result<EngineResponse> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await?;
        self.read("refresh_index", index, response).await
    }

    async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<EngineResponse> {
        self.log_request("index_document", index, document);
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(document.clone())
            .send()
            .await?;
        self.read("index_document", index, response).await
    }

    async fn bulk(&self, index: &str, lines: &[Value]) -> Result<EngineResponse> {
        if self.debug {
            debug!("OpenSearch bulk on '{}' request: {} lines", index, lines.len());
        }
        let body: Vec<JsonBody<Value>> = lines.iter().cloned().map(JsonBody::new).collect();
        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await?;
        self.read("bulk", index, response).await
    }

    async fn update_document(&self, index: &str, id: &str, body: &Value) -> Result<EngineResponse> {
        self.log_request("update_document", index, body);
        let response = self
            .client
            .update(UpdateParts::IndexId(index, id))
            .body(body.clone())
            .send()
            .await?;
        self.read("update_document", index, response).await
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<EngineResponse> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await?;
        self.read("delete_document", index, response).await
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<EngineResponse> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await?;
        self.read("get_document", index, response).await
    }

    async fn search(&self, index: &str, query: &Value) -> Result<EngineResponse> {
        self.log_request("search", index, query);
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(query.clone())
            .send()
            .await?;
        self.read("search", index, response).await
    }

    async fn count(&self, index: &str, query: &Value) -> Result<EngineResponse> {
        self.log_request("count", index, query);
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(query.clone())
            .send()
            .await?;
        self.read("count", index, response).await
    }
}

impl<D: IndexDocument> SearchIndexClient<D, OpenSearchTransport> {
    /// OpenSearch-backed client using `config.default_index` and the
    /// retry policy from the environment.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let transport = OpenSearchTransport::new(config)?;
        Ok(SearchIndexClient::new(transport, config.default_index.clone())
            .with_retry_policy(RetryPolicy::from_env()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_rejects_bad_url() {
        let config = SearchConfig {
            url: "ftp://search".to_string(),
            ..SearchConfig::default()
        };
        assert!(matches!(
            OpenSearchTransport::new(&config),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_certificate_is_config_error() {
        let config = SearchConfig {
            ca_certificate: Some(PathBuf::from("/nonexistent/search-ca.pem")),
            ..SearchConfig::default()
        };
        assert!(matches!(
            OpenSearchTransport::new(&config),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_pinned_file_must_hold_a_certificate() {
        let path = std::env::temp_dir().join(format!("search-ca-{}.pem", uuid::Uuid::now_v7()));
        std::fs::write(&path, b"-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n")
            .expect("write pem");
        let config = SearchConfig {
            ca_certificate: Some(path.clone()),
            ..SearchConfig::default()
        };
        let result = OpenSearchTransport::new(&config);
        let _ = std::fs::remove_file(&path);
        match result {
            Err(Error::ConfigError(message)) => assert!(message.contains("invalid certificate")),
            other => panic!("expected a config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builds_without_connecting() {
        let config = SearchConfig {
            credentials: Credentials::Basic {
                username: "indexer".to_string(),
                password: "pw".to_string(),
            },
            ..SearchConfig::default()
        };
        assert!(OpenSearchTransport::new(&config).is_ok());
    }
}
