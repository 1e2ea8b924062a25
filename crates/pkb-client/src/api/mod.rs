//! REST access to the knowledge-base backend.

pub mod client;
pub mod models;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::upload::job::UploadFile;

pub use client::ApiClient;
pub use models::{
    CategoryCount, CategoryHit, CategoryInfo, CategorySearchResponse, CategoryStats,
    ClassificationStatus, ParsingStatus, SearchHit, SearchRequest, SearchResponse,
    StatusResponse, UploadResponse,
};

/// Bytes of a file handed to the transport so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteProgress {
    pub sent: u64,
    pub total: u64,
}

impl ByteProgress {
    /// Fraction sent, in 0.0..=1.0. An empty file counts as fully sent.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.sent as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// The two calls the upload pipeline depends on.
#[async_trait]
pub trait IngestApi: Send + Sync {
    /// Uploads one file. Progress is reported per chunk on `progress`; a
    /// closed receiver does not abort the upload.
    async fn upload(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<ByteProgress>,
    ) -> Result<UploadResponse, ApiError>;

    async fn status(&self, content_id: &str) -> Result<StatusResponse, ApiError>;
}
