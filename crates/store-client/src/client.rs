//! Key-value store API client
//!
//! Implements the REST contract of a versioned key-value store: the store's
//! `ETag` is returned on describe and must be echoed in `If-Match` on every
//! mutation.

use crate::error::StoreError;
use crate::models::*;
use crate::store_trait::StoreClientTrait;
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Key-value store API client
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    client: Client,
    base_url: String,
}

impl HttpStoreClient {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `base_url` - Store API base URL (e.g., "http://kvs:8080")
    pub fn new(base_url: String) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(StoreError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn store_path(store_id: &str) -> String {
        format!("/stores/{}", urlencoding::encode(store_id))
    }

    fn key_path(store_id: &str, key: &str) -> String {
        format!(
            "/stores/{}/keys/{}",
            urlencoding::encode(store_id),
            urlencoding::encode(key)
        )
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and map error statuses onto [`StoreError`]
    async fn send(&self, method: &str, path: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        debug!("{} {}", method, self.build_url(path));

        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(StoreError::Http)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(format!(
                "Resource not found: {} - {}",
                path, body
            ))),
            StatusCode::PRECONDITION_FAILED => Err(StoreError::PreconditionFailed(format!(
                "{} {}: ETag no longer current - {}",
                method, path, body
            ))),
            StatusCode::BAD_REQUEST => Err(StoreError::InvalidRequest(format!(
                "{} {}: {}",
                method, path, body
            ))),
            _ => Err(StoreError::Api(format!(
                "{} {} failed: {} - {}",
                method, path, status, body
            ))),
        }
    }

    async fn read_json<T: for<'de> serde::Deserialize<'de>>(response: Response) -> Result<T, StoreError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(StoreError::Serialization)
    }
}

/// The `ETag` header exactly as sent, quotes included
fn etag_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `If-Match` needs a quoted entity-tag; bare tokens (e.g. from a write
/// response body) are quoted, already quoted or weak tags pass through.
fn if_match_value(etag: &str) -> String {
    if etag.starts_with('"') || etag.starts_with("W/") {
        etag.to_string()
    } else {
        format!("\"{}\"", etag)
    }
}

fn guarded(request: RequestBuilder, etag: &str) -> RequestBuilder {
    request.header(IF_MATCH, if_match_value(etag))
}

#[async_trait::async_trait]
impl StoreClientTrait for HttpStoreClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_stores(&self) -> Result<Vec<KeyValueStore>, StoreError> {
        let path = "/stores";
        let response = self
            .send("GET", path, self.client.get(self.build_url(path)))
            .await?;

        let output: ListStoresOutput = Self::read_json(response).await?;
        Ok(output.items)
    }

    async fn describe_store(&self, store_id: &str) -> Result<KeyValueStore, StoreError> {
        let path = Self::store_path(store_id);
        let response = self
            .send("GET", &path, self.client.get(self.build_url(&path)))
            .await?;

        let etag = etag_header(&response);
        let mut store: KeyValueStore = Self::read_json(response).await?;
        if etag.is_some() {
            store.etag = etag;
        }
        Ok(store)
    }

    async fn create_store(&self, request: &CreateStoreRequest) -> Result<KeyValueStore, StoreError> {
        if request.name.is_empty() {
            return Err(StoreError::InvalidRequest("store name must not be empty".to_string()));
        }

        let path = "/stores";
        let response = self
            .send("POST", path, self.client.post(self.build_url(path)).json(request))
            .await?;

        let etag = etag_header(&response);
        let mut store: KeyValueStore = Self::read_json(response).await?;
        if etag.is_some() {
            store.etag = etag;
        }
        Ok(store)
    }

    async fn delete_store(&self, store_id: &str, if_match: &str) -> Result<(), StoreError> {
        let path = Self::store_path(store_id);
        self.send(
            "DELETE",
            &path,
            guarded(self.client.delete(self.build_url(&path)), if_match),
        )
        .await?;
        Ok(())
    }

    async fn list_keys(&self, store_id: &str) -> Result<Vec<KeyEntry>, StoreError> {
        let path = format!("{}/keys", Self::store_path(store_id));
        let response = self
            .send("GET", &path, self.client.get(self.build_url(&path)))
            .await?;

        let output: ListKeysOutput = Self::read_json(response).await?;
        Ok(output.items)
    }

    async fn get_key(&self, store_id: &str, key: &str) -> Result<KeyEntry, StoreError> {
        let path = Self::key_path(store_id, key);
        let response = self
            .send("GET", &path, self.client.get(self.build_url(&path)))
            .await?;
        Self::read_json(response).await
    }

    async fn put_key(&self, store_id: &str, key: &str, value: &str, if_match: &str) -> Result<PutKeyOutput, StoreError> {
        let path = Self::key_path(store_id, key);
        let body = PutKeyRequest {
            value: value.to_string(),
        };
        let response = self
            .send(
                "PUT",
                &path,
                guarded(self.client.put(self.build_url(&path)), if_match).json(&body),
            )
            .await?;
        Self::read_json(response).await
    }

    async fn delete_key(&self, store_id: &str, key: &str, if_match: &str) -> Result<DeleteKeyOutput, StoreError> {
        let path = Self::key_path(store_id, key);
        let response = self
            .send(
                "DELETE",
                &path,
                guarded(self.client.delete(self.build_url(&path)), if_match),
            )
            .await?;
        Self::read_json(response).await
    }
}
