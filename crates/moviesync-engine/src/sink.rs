//! Search index client: idempotent index creation and bulk upserts.

use moviesync_types::MovieDoc;
use serde_json::{json, Value};

use crate::errors::{EtlError, Result};

/// Fixed name of the search index the pipeline writes to.
pub const INDEX_NAME: &str = "movies";

/// One rejected document out of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

impl ItemFailure {
    /// Rejections worth retrying: overload and gateway-style statuses.
    /// Schema violations (strict mapping) and other 4xx are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, 408 | 429 | 502 | 503 | 504)
    }
}

/// HTTP client for the search index, held open for the session lifetime.
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create the index if it does not exist yet. An
    /// `resource_already_exists_exception` answer counts as success.
    ///
    /// # Errors
    ///
    /// [`EtlError::IndexUnavailable`] on connection failure,
    /// [`EtlError::Fatal`] if the index definition itself is rejected.
    pub async fn ensure_index(&self) -> Result<()> {
        let url = format!("{}/{}", self.base_url, INDEX_NAME);
        let resp = self
            .http
            .put(&url)
            .json(&index_settings())
            .send()
            .await
            .map_err(EtlError::from_http)?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(index = INDEX_NAME, "Created search index");
            return Ok(());
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status.as_u16() == 400
            && body["error"]["type"] == "resource_already_exists_exception"
        {
            tracing::debug!(index = INDEX_NAME, "Search index already present");
            return Ok(());
        }
        if status.is_server_error() {
            return Err(EtlError::IndexUnavailable(format!(
                "index creation returned {status}"
            )));
        }
        Err(EtlError::Fatal(anyhow::anyhow!(
            "index creation rejected ({status}): {body}"
        )))
    }

    /// Upsert a batch of documents by id via the bulk endpoint, returning
    /// the per-item rejections (empty when everything was accepted).
    ///
    /// # Errors
    ///
    /// [`EtlError::IndexUnavailable`] on connection failure or a 5xx bulk
    /// response; a per-item rejection is data, not an error.
    pub async fn bulk(&self, docs: &[MovieDoc]) -> Result<Vec<ItemFailure>> {
        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(INDEX_NAME, docs)?)
            .send()
            .await
            .map_err(EtlError::from_http)?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(EtlError::IndexUnavailable(format!(
                "bulk write returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(EtlError::Fatal(anyhow::anyhow!(
                "bulk write rejected with {status}"
            )));
        }

        let body: Value = resp.json().await.map_err(EtlError::from_http)?;
        Ok(parse_bulk_response(&body))
    }
}

/// Build the NDJSON bulk payload: an index action (upsert keyed by document
/// id) followed by the document source, per document.
pub(crate) fn bulk_body(index: &str, docs: &[MovieDoc]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        let source = serde_json::to_string(doc)
            .map_err(|e| EtlError::Fatal(anyhow::anyhow!("document serialization failed: {e}")))?;
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

/// Extract per-item failures from a bulk response body.
pub(crate) fn parse_bulk_response(body: &Value) -> Vec<ItemFailure> {
    if body["errors"] != Value::Bool(true) {
        return Vec::new();
    }
    let items = match body["items"].as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };

    let mut failures = Vec::new();
    for item in items {
        let result = &item["index"];
        let status = result["status"].as_u64().unwrap_or(0) as u16;
        if status >= 300 {
            failures.push(ItemFailure {
                id: result["_id"].as_str().unwrap_or_default().to_string(),
                status,
                reason: result["error"]["reason"]
                    .as_str()
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
    }
    failures
}

/// Index settings: two-language (ru/en) analysis chain and a strict mapping
/// so unknown fields are rejected at write time.
fn index_settings() -> Value {
    json!({
        "settings": {
            "refresh_interval": "1s",
            "analysis": {
                "filter": {
                    "english_stop": { "type": "stop", "stopwords": "_english_" },
                    "english_stemmer": { "type": "stemmer", "language": "english" },
                    "english_possessive_stemmer": {
                        "type": "stemmer",
                        "language": "possessive_english"
                    },
                    "russian_stop": { "type": "stop", "stopwords": "_russian_" },
                    "russian_stemmer": { "type": "stemmer", "language": "russian" }
                },
                "analyzer": {
                    "ru_en": {
                        "tokenizer": "standard",
                        "filter": [
                            "lowercase",
                            "english_stop",
                            "english_stemmer",
                            "english_possessive_stemmer",
                            "russian_stop",
                            "russian_stemmer"
                        ]
                    }
                }
            }
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "id": { "type": "keyword" },
                "imdb_rating": { "type": "float" },
                "genre": { "type": "keyword" },
                "title": {
                    "type": "text",
                    "analyzer": "ru_en",
                    "fields": { "raw": { "type": "keyword" } }
                },
                "description": { "type": "text", "analyzer": "ru_en" },
                "director": { "type": "text", "analyzer": "ru_en" },
                "actors_names": { "type": "text", "analyzer": "ru_en" },
                "writers_names": { "type": "text", "analyzer": "ru_en" },
                "actors": {
                    "type": "nested",
                    "dynamic": "strict",
                    "properties": {
                        "id": { "type": "keyword" },
                        "name": { "type": "text", "analyzer": "ru_en" }
                    }
                },
                "writers": {
                    "type": "nested",
                    "dynamic": "strict",
                    "properties": {
                        "id": { "type": "keyword" },
                        "name": { "type": "text", "analyzer": "ru_en" }
                    }
                }
            }
        }
    })
}
