//! Firestore document store client
//!
//! Talks to the Firestore REST API. Records map onto documents as:
//!
//! | record field | document field | value type |
//! |--------------|----------------|------------|
//! | `id`         | last segment of `name` | - |
//! | `label`      | `label`        | `stringValue` |
//! | `prompt`     | `prompt`       | `stringValue` |
//! | `color`      | `color`        | `stringValue` |
//! | `order`      | `order`        | `integerValue` (decimal string) |
//!
//! Writes send the whole document without an update mask, so a write
//! replaces the stored document the way `setDoc` does.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{DocumentStore, StoreError, StoreResult};
use crate::config::FirebaseConfig;
use crate::models::{Collection, PromptItem};

/// Production Firestore REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Documents requested per list page
const PAGE_SIZE: u32 = 300;

/// Field names used in stored documents
mod fields {
    pub const LABEL: &str = "label";
    pub const PROMPT: &str = "prompt";
    pub const COLOR: &str = "color";
    pub const ORDER: &str = "order";
}

/// REST client for a Firestore database
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    http: Client,
    /// `projects/{project}/databases/(default)/documents`
    database_path: String,
    /// `{endpoint}/{database_path}`
    documents_url: Url,
    api_key: Option<String>,
}

impl FirestoreStore {
    /// Create a client for the given project
    pub fn new(
        project_id: &str,
        api_key: Option<String>,
        endpoint: Option<&str>,
    ) -> StoreResult<Self> {
        let endpoint = endpoint.unwrap_or(DEFAULT_ENDPOINT).trim_end_matches('/');
        let database_path = format!("projects/{}/databases/(default)/documents", project_id);
        let documents_url = Url::parse(&format!("{}/{}", endpoint, database_path))
            .map_err(|e| StoreError::InvalidDocument(format!("Invalid endpoint: {}", e)))?;

        Ok(Self {
            http: Client::new(),
            database_path,
            documents_url,
            api_key,
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &FirebaseConfig) -> StoreResult<Self> {
        let project_id = config
            .project_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(StoreError::NotConfigured)?;
        Self::new(project_id, config.api_key.clone(), config.endpoint.as_deref())
    }

    /// URL of a collection or a document inside it
    fn url(&self, collection: Collection, id: Option<&str>) -> Url {
        let mut url = self.documents_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(collection.name());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        self.with_key(url)
    }

    /// URL of the batch commit endpoint
    fn commit_url(&self) -> Url {
        let mut url = self.documents_url.clone();
        let path = format!("{}:commit", url.path());
        url.set_path(&path);
        self.with_key(url)
    }

    fn with_key(&self, mut url: Url) -> Url {
        if let Some(ref key) = self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        url
    }

    /// Full resource name of a document, as used in batch writes
    fn document_name(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}/{}", self.database_path, collection.name(), id)
    }

    async fn list_page(
        &self,
        collection: Collection,
        page_token: Option<&str>,
    ) -> StoreResult<ListResponse> {
        let mut url = self.url(collection, None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &PAGE_SIZE.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let response = check(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn backend_name(&self) -> &'static str {
        "firestore"
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<PromptItem>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(collection, page_token.as_deref()).await?;
            for document in page.documents {
                items.push(decode_document(&document)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} documents from {}", items.len(), collection);
        Ok(items)
    }

    async fn put(&self, collection: Collection, item: &PromptItem) -> StoreResult<()> {
        let body = json!({ "fields": encode_fields(item) });
        check(
            self.http
                .patch(self.url(collection, Some(&item.id)))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let response = self
            .http
            .delete(self.url(collection, Some(id)))
            .send()
            .await?;

        // Firestore answers 200 for missing documents, some emulators 404
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn replace_all(&self, collection: Collection, items: &[PromptItem]) -> StoreResult<()> {
        let keep: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        let stale: Vec<String> = self
            .list(collection)
            .await?
            .into_iter()
            .map(|item| item.id)
            .filter(|id| !keep.contains(id.as_str()))
            .collect();

        let mut writes: Vec<Value> = items
            .iter()
            .map(|item| {
                json!({
                    "update": {
                        "name": self.document_name(collection, &item.id),
                        "fields": encode_fields(item),
                    }
                })
            })
            .collect();
        writes.extend(
            stale
                .iter()
                .map(|id| json!({ "delete": self.document_name(collection, id) })),
        );

        info!(
            "Committing {} writes and {} deletes to {}",
            items.len(),
            stale.len(),
            collection
        );

        check(
            self.http
                .post(self.commit_url())
                .json(&json!({ "writes": writes }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

/// One page of a `documents.list` response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// A Firestore document as returned by the REST API
#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

/// Encode a record into Firestore typed fields
fn encode_fields(item: &PromptItem) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(fields::LABEL.into(), json!({ "stringValue": item.label }));
    map.insert(fields::PROMPT.into(), json!({ "stringValue": item.prompt }));
    if let Some(ref color) = item.color {
        map.insert(fields::COLOR.into(), json!({ "stringValue": color }));
    }
    if let Some(order) = item.order {
        map.insert(
            fields::ORDER.into(),
            json!({ "integerValue": order.to_string() }),
        );
    }
    map
}

/// Decode a Firestore document into a record
fn decode_document(document: &Document) -> StoreResult<PromptItem> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::InvalidDocument(format!("bad name '{}'", document.name)))?;

    let required = |field: &str| {
        string_value(document.fields.get(field)).ok_or_else(|| {
            StoreError::InvalidDocument(format!("document '{}' has no {}", id, field))
        })
    };

    Ok(PromptItem {
        id: id.to_string(),
        label: required(fields::LABEL)?,
        prompt: required(fields::PROMPT)?,
        color: string_value(document.fields.get(fields::COLOR)),
        order: order_value(document.fields.get(fields::ORDER)),
    })
}

fn string_value(value: Option<&Value>) -> Option<String> {
    value?.get("stringValue")?.as_str().map(String::from)
}

fn order_value(value: Option<&Value>) -> Option<u32> {
    let value = value?;
    if let Some(int) = value.get("integerValue") {
        // int64 values arrive as decimal strings
        return match int {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64().and_then(|n| u32::try_from(n).ok()),
        };
    }
    value
        .get("doubleValue")?
        .as_f64()
        .filter(|f| *f >= 0.0 && *f <= f64::from(u32::MAX))
        .map(|f| f as u32)
}

/// Turn non-success responses into [`StoreError::Status`]
async fn check(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status,
        message: error_message(&body),
    })
}

/// Extract `error.message` from a Firestore error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("message")?.as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
