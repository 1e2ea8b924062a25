use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{multipart, Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::api::models::{
    CategorySearchResponse, CategoryStats, SearchRequest, SearchResponse, StatusResponse,
    UploadResponse,
};
use crate::api::{ByteProgress, IngestApi};
use crate::config::{ClientConfig, HttpConfig};
use crate::error::ApiError;
use crate::upload::job::UploadFile;

/// Maximum length of a raw response body carried into an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Default number of documents listed per category.
pub const DEFAULT_CATEGORY_TOP_K: u32 = 20;

fn truncate_body(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY_LENGTH {
        let head: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    }
}

/// Error text of a non-success answer: `detail`, then `error`, then the body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error"] {
            match value.get(key) {
                Some(serde_json::Value::String(message)) => return message.clone(),
                Some(other) if !other.is_null() => return truncate_body(&other.to_string()),
                _ => {}
            }
        }
    }
    if body.trim().is_empty() {
        return "empty response body".to_string();
    }
    truncate_body(body)
}

fn create_http_client(config: &HttpConfig) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(ApiError::Http)
}

/// HTTP client for the knowledge-base REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    upload_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.api_base_url.trim()).map_err(|e| {
            ApiError::InvalidRequest(format!(
                "Invalid api_base_url '{}': {}",
                config.api_base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "api_base_url '{}' cannot carry a path",
                config.api_base_url
            )));
        }

        Ok(Self {
            http: create_http_client(&config.http)?,
            base_url,
            upload_timeout: Duration::from_secs(config.http.upload_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest("api_base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Uploads a file as multipart field `file`, streamed from disk.
    pub async fn upload_file(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<ByteProgress>,
    ) -> Result<UploadResponse, ApiError> {
        let handle = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| ApiError::ReadFile {
                path: file.path.clone(),
                source,
            })?;

        let total = file.size_bytes;
        let mut sent = 0u64;
        let stream = ReaderStream::new(handle).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                // The receiver may be gone; the upload carries on regardless.
                let _ = progress.send(ByteProgress { sent, total });
            }
            chunk
        });

        let part = multipart::Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type())?;
        let form = multipart::Form::new().part("file", part);

        let url = self.endpoint(&["ingest", "upload"])?;
        debug!(file = %file.name, bytes = total, "Uploading file");
        let response = self
            .http
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = decode(response).await?;
        if !upload.is_success() {
            let message = upload
                .message
                .clone()
                .unwrap_or_else(|| format!("status '{}' without content id", upload.status));
            warn!(file = %file.name, "Upload rejected: {}", message);
            return Err(ApiError::Rejected(message));
        }

        info!(file = %file.name, content_id = %upload.content_id, "Upload accepted");
        Ok(upload)
    }

    pub async fn status(&self, content_id: &str) -> Result<StatusResponse, ApiError> {
        let url = self.endpoint(&["ingest", "status", content_id])?;
        self.get_json(url).await
    }

    pub async fn category_stats(&self) -> Result<CategoryStats, ApiError> {
        let url = self.endpoint(&["search", "categories", "stats"])?;
        self.get_json(url).await
    }

    /// Lists the documents filed under a category, optionally filtered.
    pub async fn category_documents(
        &self,
        category: &str,
        query: Option<&str>,
        top_k: u32,
    ) -> Result<CategorySearchResponse, ApiError> {
        let mut url = self.endpoint(&["search", "category", category])?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
                pairs.append_pair("q", q);
            }
            pairs.append_pair("top_k", &top_k.to_string());
        }

        let response: CategorySearchResponse = self.get_json(url).await?;
        if let Some(error) = &response.error {
            return Err(ApiError::Rejected(error.clone()));
        }
        Ok(response)
    }

    /// Searches all documents. Filters of `request` narrow the hits.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        if request.query.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "Search query must not be empty".to_string(),
            ));
        }
        if request.top_k == 0 {
            return Err(ApiError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }

        let response: SearchResponse = self
            .get_json_with_query(&["search", ""], &request.query_pairs())
            .await?;
        if let Some(error) = &response.error {
            warn!(query = %request.query, "Search failed on the backend: {}", error);
            return Err(ApiError::Rejected(error.clone()));
        }
        debug!(query = %request.query, hits = response.results.len(), "Search answered");
        Ok(response)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    pub(crate) async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        self.get_json(url).await
    }

    pub(crate) async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        decode(response).await
    }

    pub(crate) async fn put_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "PUT");
        let response = self.http.put(url).json(body).send().await?;
        decode(response).await
    }

    pub(crate) async fn delete_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "DELETE");
        let response = self.http.delete(url).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        ApiError::Decode(format!("{} (body: {})", e, truncate_body(&body)))
    })
}

#[async_trait]
impl IngestApi for ApiClient {
    async fn upload(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<ByteProgress>,
    ) -> Result<UploadResponse, ApiError> {
        self.upload_file(file, progress).await
    }

    async fn status(&self, content_id: &str) -> Result<StatusResponse, ApiError> {
        ApiClient::status(self, content_id).await
    }
}
