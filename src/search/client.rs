use super::analysis::index_settings;
use super::transport::{EngineResponse, SearchTransport};
use super::{SearchHit, SearchResults};
use crate::entity::{IndexDocument, Indexable};
use crate::error::{Error, Result};
use crate::lookup::Lookup;
use crate::repository::PrimaryRepository;
use crate::retry::{CancelSignal, RetryPolicy};
use crate::specification::Specification;
use crate::workflow::SearchSync;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::sync::Arc;

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Resilient client for one document type `D`.
///
/// Cloning is cheap; clones share the transport.
pub struct SearchIndexClient<D: IndexDocument, P: SearchTransport> {
    transport: Arc<P>,
    retry: RetryPolicy,
    cancel: CancelSignal,
    default_index: String,
    _document: PhantomData<fn() -> D>,
}

impl<D: IndexDocument, P: SearchTransport> Clone for SearchIndexClient<D, P> {
    fn clone(&self) -> Self {
        SearchIndexClient {
            transport: self.transport.clone(),
            retry: self.retry.clone(),
            cancel: self.cancel.clone(),
            default_index: self.default_index.clone(),
            _document: PhantomData,
        }
    }
}

impl<D: IndexDocument, P: SearchTransport> SearchIndexClient<D, P> {
    /// Client with the default retry policy (3 attempts, 5 s apart).
    pub fn new(transport: P, default_index: impl Into<String>) -> Self {
        let default_index = default_index.into();
        info!("Search client created (default index '{}')", default_index);
        SearchIndexClient {
            transport: Arc::new(transport),
            retry: RetryPolicy::default(),
            cancel: CancelSignal::new(),
            default_index,
            _document: PhantomData,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Signal that aborts pending retries, typically the request's.
    pub fn with_cancellation(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn default_index(&self) -> &str {
        &self.default_index
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }

    /// Create `index` with the standard analysis settings. An index that
    /// already exists counts as created.
    pub async fn create_index(&self, index: &str) -> Result<bool> {
        let transport = &*self.transport;
        let settings = index_settings();
        let settings = &settings;

        let response = self
            .retry
            .execute_if("create_index", &self.cancel, Error::is_transient, move || {
                transport.create_index(index, settings)
            })
            .await?;

        if response.is_success() {
            info!("Created search index '{}'", index);
            Ok(true)
        } else if response.error_type() == Some(ALREADY_EXISTS) {
            debug!("Search index '{}' already exists", index);
            Ok(true)
        } else {
            Ok(engine_fault("create_index", index, &response))
        }
    }

    /// Delete `index`. A missing index counts as deleted.
    pub async fn delete_index(&self, index: &str) -> Result<bool> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("delete_index", &self.cancel, Error::is_transient, move || {
                transport.delete_index(index)
            })
            .await?;

        if response.is_success() || response.is_not_found() {
            info!("Deleted search index '{}'", index);
            Ok(true)
        } else {
            Ok(engine_fault("delete_index", index, &response))
        }
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("index_exists", &self.cancel, Error::is_transient, move || {
                transport.index_exists(index)
            })
            .await?;

        if response.is_success() {
            Ok(true)
        } else if response.is_not_found() {
            Ok(false)
        } else {
            Ok(engine_fault("index_exists", index, &response))
        }
    }

    /// Make recent writes to `index` visible to searches.
    pub async fn refresh_index(&self, index: &str) -> Result<bool> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("refresh_index", &self.cancel, Error::is_transient, move || {
                transport.refresh_index(index)
            })
            .await?;

        if response.is_success() {
            Ok(true)
        } else {
            Ok(engine_fault("refresh_index", index, &response))
        }
    }

    /// Insert or replace one document under its `document_id()`.
    pub async fn index_document(&self, document: &D, index: &str) -> Result<bool> {
        let transport = &*self.transport;
        let id = document.document_id();
        let id = id.as_str();
        let body = serde_json::to_value(document)?;
        let body = &body;

        let response = self
            .retry
            .execute_if("index_document", &self.cancel, Error::is_transient, move || {
                transport.index_document(index, id, body)
            })
            .await?;

        if response.is_success() {
            debug!("Indexed document '{}' into '{}'", id, index);
            Ok(true)
        } else {
            Ok(engine_fault("index_document", index, &response))
        }
    }

    /// Bulk upsert. `false` if any single item was rejected; the rejected
    /// items are logged. An empty batch succeeds without a request.
    pub async fn index_many(&self, documents: &[D], index: &str) -> Result<bool> {
        if documents.is_empty() {
            debug!("Nothing to index into '{}'", index);
            return Ok(true);
        }

        let mut lines = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            lines.push(json!({ "index": { "_id": document.document_id() } }));
            lines.push(serde_json::to_value(document)?);
        }

        let transport = &*self.transport;
        let lines = lines.as_slice();
        let response = self
            .retry
            .execute_if("index_many", &self.cancel, Error::is_transient, move || {
                transport.bulk(index, lines)
            })
            .await?;

        if !response.is_success() {
            return Ok(engine_fault("index_many", index, &response));
        }

        if response.body["errors"].as_bool() == Some(true) {
            let failed = failed_bulk_items(&response.body);
            error!(
                "Bulk indexing into '{}' rejected {} of {} documents: {}",
                index,
                failed.len(),
                documents.len(),
                Value::Array(failed)
            );
            return Ok(false);
        }

        info!("Indexed {} documents into '{}'", documents.len(), index);
        Ok(true)
    }

    /// Merge `partial` into the stored document.
    pub async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<bool> {
        let transport = &*self.transport;
        let body = json!({ "doc": partial });
        let body = &body;

        let response = self
            .retry
            .execute_if("update_document", &self.cancel, Error::is_transient, move || {
                transport.update_document(index, id, body)
            })
            .await?;

        if response.is_success() {
            debug!("Updated document '{}' in '{}'", id, index);
            Ok(true)
        } else {
            Ok(engine_fault("update_document", index, &response))
        }
    }

    /// Remove one document. A document that is already gone counts as removed.
    pub async fn delete_document(&self, index: &str, id: &str) -> Result<bool> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("delete_document", &self.cancel, Error::is_transient, move || {
                transport.delete_document(index, id)
            })
            .await?;

        if response.is_success() || response.is_not_found() {
            debug!("Deleted document '{}' from '{}'", id, index);
            Ok(true)
        } else {
            Ok(engine_fault("delete_document", index, &response))
        }
    }

    pub async fn get_document(&self, index: &str, id: &str) -> Result<Lookup<D>> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("get_document", &self.cancel, Error::is_transient, move || {
                transport.get_document(index, id)
            })
            .await?;

        if response.is_not_found() || response.body["found"].as_bool() == Some(false) {
            return Ok(Lookup::NotFound);
        }
        if !response.is_success() {
            engine_fault("get_document", index, &response);
            return Ok(Lookup::Error(describe(&response)));
        }

        match serde_json::from_value::<D>(response.body["_source"].clone()) {
            Ok(document) => Ok(Lookup::Found(document)),
            Err(e) => {
                error!("Document '{}' in '{}' does not decode: {}", id, index, e);
                Ok(Lookup::Error(e.to_string()))
            }
        }
    }

    /// Run an engine-native query against `index`. A missing index is
    /// `NotFound`.
    pub async fn search(&self, index: &str, query: &Value) -> Result<Lookup<SearchResults<D>>> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("search", &self.cancel, Error::is_transient, move || {
                transport.search(index, query)
            })
            .await?;

        if response.is_not_found() {
            return Ok(Lookup::NotFound);
        }
        if !response.is_success() {
            engine_fault("search", index, &response);
            return Ok(Lookup::Error(describe(&response)));
        }

        match parse_hits::<D>(&response.body) {
            Ok(results) => {
                debug!(
                    "Search on '{}' matched {} ({} returned)",
                    index,
                    results.total,
                    results.hits.len()
                );
                Ok(Lookup::Found(results))
            }
            Err(e) => {
                error!("Search response from '{}' does not decode: {}", index, e);
                Ok(Lookup::Error(e.to_string()))
            }
        }
    }

    pub async fn count(&self, index: &str, query: &Value) -> Result<Lookup<u64>> {
        let transport = &*self.transport;
        let response = self
            .retry
            .execute_if("count", &self.cancel, Error::is_transient, move || {
                transport.count(index, query)
            })
            .await?;

        if response.is_not_found() {
            return Ok(Lookup::NotFound);
        }
        if !response.is_success() {
            engine_fault("count", index, &response);
            return Ok(Lookup::Error(describe(&response)));
        }

        match response.body["count"].as_u64() {
            Some(count) => Ok(Lookup::Found(count)),
            None => Ok(Lookup::Error(format!(
                "count response without a count: {}",
                response.body
            ))),
        }
    }

    /// Rebuild `index` from the primary store.
    ///
    /// Creates the index when missing, loads `source.list(spec)`, bulk
    /// indexes the projections and refreshes. No matching rows leaves the
    /// index in place and succeeds.
    pub async fn bulk_reindex_from_query<E, S, R>(
        &self,
        index: &str,
        source: &R,
        spec: &S,
    ) -> Result<bool>
    where
        E: Indexable<Document = D>,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        if !self.index_exists(index).await? && !self.create_index(index).await? {
            return Ok(false);
        }

        let entities = source.list(spec).await?;
        if entities.is_empty() {
            warn!(
                "Reindex of '{}' from {} found no {} rows; index left empty",
                index,
                spec.name(),
                E::entity_name()
            );
            return Ok(true);
        }

        let documents: Vec<D> = entities.iter().map(|entity| entity.to_document()).collect();
        if !self.index_many(&documents, index).await? {
            return Ok(false);
        }

        let refreshed = self.refresh_index(index).await?;
        info!(
            "Reindexed {} {} rows into '{}'",
            documents.len(),
            E::entity_name(),
            index
        );
        Ok(refreshed)
    }
}

impl<E, P> SearchSync<E> for SearchIndexClient<E::Document, P>
where
    E: Indexable,
    P: SearchTransport,
{
    async fn upsert(&self, entity: &E) -> Result<bool> {
        self.index_document(&entity.to_document(), &self.default_index)
            .await
    }

    async fn remove(&self, id: &E::Id) -> Result<bool> {
        self.delete_document(&self.default_index, &E::document_id_for(id))
            .await
    }
}

fn engine_fault(operation: &str, index: &str, response: &EngineResponse) -> bool {
    error!(
        "Search engine rejected {} on '{}' (status {}): {}",
        operation, index, response.status, response.body
    );
    false
}

fn describe(response: &EngineResponse) -> String {
    match response.error_type() {
        Some(kind) => format!("status {}: {}", response.status, kind),
        None => format!("status {}", response.status),
    }
}

/// Bulk items carrying an `error`, whatever their action key.
fn failed_bulk_items(body: &Value) -> Vec<Value> {
    body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .flat_map(|item| item.values())
                .filter(|result| !result["error"].is_null())
                .map(|result| json!({ "_id": result["_id"], "error": result["error"] }))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_hits<D: IndexDocument>(body: &Value) -> serde_json::Result<SearchResults<D>> {
    let hits = &body["hits"];
    let total = match &hits["total"] {
        Value::Object(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
        other => other.as_u64().unwrap_or(0),
    };

    let mut parsed = Vec::new();
    for hit in hits["hits"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
        parsed.push(SearchHit {
            id: hit["_id"].as_str().unwrap_or_default().to_string(),
            score: hit["_score"].as_f64(),
            document: serde_json::from_value(hit["_source"].clone())?,
        });
    }

    Ok(SearchResults { total, hits: parsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PolicyDocument {
        policy_id: String,
        title: String,
    }

    impl IndexDocument for PolicyDocument {
        fn document_id(&self) -> String {
            self.policy_id.clone()
        }
    }

    /// Replays canned answers in order; 200 `{}` once they run out.
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<VecDeque<Result<EngineResponse>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn with(answers: Vec<Result<EngineResponse>>) -> Self {
            Scripted {
                answers: Mutex::new(answers.into()),
                calls: Mutex::default(),
            }
        }

        fn next(&self, call: String) -> Result<EngineResponse> {
            self.calls.lock().expect("calls lock").push(call);
            self.answers
                .lock()
                .expect("answers lock")
                .pop_front()
                .unwrap_or_else(|| Ok(EngineResponse::new(200, json!({}))))
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl SearchTransport for Scripted {
        async fn create_index(&self, index: &str, _settings: &Value) -> Result<EngineResponse> {
            self.next(format!("create_index {}", index))
        }
        async fn delete_index(&self, index: &str) -> Result<EngineResponse> {
            self.next(format!("delete_index {}", index))
        }
        async fn index_exists(&self, index: &str) -> Result<EngineResponse> {
            self.next(format!("index_exists {}", index))
        }
        async fn refresh_index(&self, index: &str) -> Result<EngineResponse> {
            self.next(format!("refresh_index {}", index))
        }
        async fn index_document(&self, index: &str, id: &str, _doc: &Value) -> Result<EngineResponse> {
            self.next(format!("index_document {} {}", index, id))
        }
        async fn bulk(&self, index: &str, lines: &[Value]) -> Result<EngineResponse> {
            self.next(format!("bulk {} {}", index, lines.len()))
        }
        async fn update_document(&self, index: &str, id: &str, body: &Value) -> Result<EngineResponse> {
            self.next(format!("update_document {} {} {}", index, id, body))
        }
        async fn delete_document(&self, index: &str, id: &str) -> Result<EngineResponse> {
            self.next(format!("delete_document {} {}", index, id))
        }
        async fn get_document(&self, index: &str, id: &str) -> Result<EngineResponse> {
            self.next(format!("get_document {} {}", index, id))
        }
        async fn search(&self, index: &str, _query: &Value) -> Result<EngineResponse> {
            self.next(format!("search {}", index))
        }
        async fn count(&self, index: &str, _query: &Value) -> Result<EngineResponse> {
            self.next(format!("count {}", index))
        }
    }

    fn client(answers: Vec<Result<EngineResponse>>) -> SearchIndexClient<PolicyDocument, Scripted> {
        SearchIndexClient::new(Scripted::with(answers), "policies")
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_create_index_already_exists_is_success() {
        let client = client(vec![Ok(EngineResponse::new(
            400,
            json!({"error": {"type": ALREADY_EXISTS}}),
        ))]);
        assert!(client.create_index("policies").await.expect("create"));
    }

    #[tokio::test]
    async fn test_create_index_engine_fault_is_false() {
        let client = client(vec![Ok(EngineResponse::new(
            400,
            json!({"error": {"type": "illegal_argument_exception"}}),
        ))]);
        assert!(!client.create_index("policies").await.expect("create"));
    }

    #[tokio::test]
    async fn test_transport_error_retried_then_succeeds() {
        let client = client(vec![
            Err(Error::SearchError("connection refused".into())),
            Ok(EngineResponse::new(200, json!({}))),
        ]);
        assert!(client.refresh_index("policies").await.expect("refresh"));
        assert_eq!(client.transport().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let client = client(vec![
            Err(Error::ConfigError("bad certificate".into())),
            Ok(EngineResponse::new(200, json!({}))),
        ]);
        let result = client.refresh_index("policies").await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
        assert_eq!(client.transport().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_get_document() {
        let client = client(vec![
            Ok(EngineResponse::new(
                200,
                json!({"found": true, "_id": "p1", "_source": {"policy_id": "p1", "title": "Access"}}),
            )),
            Ok(EngineResponse::new(404, json!({"found": false}))),
            Ok(EngineResponse::new(200, json!({"found": true, "_source": {"unexpected": 1}}))),
        ]);

        let found = client.get_document("policies", "p1").await.expect("get");
        assert_eq!(
            found,
            Lookup::Found(PolicyDocument {
                policy_id: "p1".into(),
                title: "Access".into()
            })
        );
        assert!(client
            .get_document("policies", "p2")
            .await
            .expect("get")
            .is_not_found());
        assert!(matches!(
            client.get_document("policies", "p3").await.expect("get"),
            Lookup::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_search_parses_hits() {
        let client = client(vec![Ok(EngineResponse::new(
            200,
            json!({
                "hits": {
                    "total": {"value": 12, "relation": "eq"},
                    "hits": [
                        {"_id": "p1", "_score": 1.5, "_source": {"policy_id": "p1", "title": "Access"}},
                        {"_id": "p2", "_score": null, "_source": {"policy_id": "p2", "title": "Backup"}}
                    ]
                }
            }),
        ))]);

        let results = client
            .search("policies", &json!({"query": {"match_all": {}}}))
            .await
            .expect("search")
            .found()
            .expect("results");

        assert_eq!(results.total, 12);
        assert_eq!(results.hits.len(), 2);
        assert_eq!(results.hits[0].score, Some(1.5));
        assert_eq!(results.hits[1].score, None);
        assert_eq!(results.hits[1].document.title, "Backup");
    }

    #[tokio::test]
    async fn test_count_and_missing_index() {
        let client = client(vec![
            Ok(EngineResponse::new(200, json!({"count": 4}))),
            Ok(EngineResponse::new(404, json!({"error": {"type": "index_not_found_exception"}}))),
        ]);
        let query = json!({"query": {"match_all": {}}});

        assert_eq!(client.count("policies", &query).await.expect("count"), Lookup::Found(4));
        assert_eq!(client.count("missing", &query).await.expect("count"), Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_update_wraps_partial_in_doc() {
        let client = client(vec![]);
        assert!(client
            .update_document("policies", "p1", &json!({"title": "New"}))
            .await
            .expect("update"));
        assert_eq!(
            client.transport().calls(),
            vec![r#"update_document policies p1 {"doc":{"title":"New"}}"#.to_string()]
        );
    }

    #[test]
    fn test_failed_bulk_items() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "p1", "status": 201}},
                {"index": {"_id": "p2", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
            ]
        });
        let failed = failed_bulk_items(&body);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["_id"], "p2");
    }
}
