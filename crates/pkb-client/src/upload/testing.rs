//! Scripted `IngestApi` for unit tests of the poller and coordinator.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::api::{
    ByteProgress, ClassificationStatus, IngestApi, ParsingStatus, StatusResponse, UploadResponse,
};
use crate::error::ApiError;
use crate::upload::job::UploadFile;

/// One scripted answer of the status endpoint.
#[derive(Debug, Clone)]
pub enum Step {
    Status(StatusResponse),
    Fail,
}

fn response(
    parsing: ParsingStatus,
    classification: ClassificationStatus,
    show_classification: bool,
) -> StatusResponse {
    StatusResponse {
        content_id: "scripted".to_string(),
        parsing_status: parsing,
        classification_status: classification,
        show_classification,
        ..Default::default()
    }
}

pub fn status(
    parsing: ParsingStatus,
    classification: ClassificationStatus,
    show_classification: bool,
) -> Step {
    Step::Status(response(parsing, classification, show_classification))
}

pub fn completed_with(names: &[&str]) -> Step {
    let mut completed = response(
        ParsingStatus::Completed,
        ClassificationStatus::Completed,
        true,
    );
    completed.categories = names
        .iter()
        .map(|name| crate::api::CategoryHit {
            id: None,
            name: name.to_string(),
            confidence: Some(0.9),
            reasoning: None,
            role: Some("primary_system".to_string()),
            source: Some("ai".to_string()),
        })
        .collect();
    Step::Status(completed)
}

/// Status answers are consumed in order per content id; the last one repeats.
/// Uploads succeed with content id `c-<file name>` unless the file name was
/// marked as failing.
#[derive(Default)]
pub struct ScriptedApi {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    failing_uploads: Mutex<HashSet<String>>,
    pub upload_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, content_id: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(content_id.to_string(), steps.into());
    }

    pub fn fail_upload(&self, file_name: &str) {
        self.failing_uploads
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn uploads(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngestApi for ScriptedApi {
    async fn upload(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<ByteProgress>,
    ) -> Result<UploadResponse, ApiError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let total = file.size_bytes;
        let _ = progress.send(ByteProgress {
            sent: total / 2,
            total,
        });
        tokio::task::yield_now().await;
        let _ = progress.send(ByteProgress { sent: total, total });

        if self.failing_uploads.lock().unwrap().contains(&file.name) {
            return Err(ApiError::Status {
                status: 500,
                message: "disk full".to_string(),
            });
        }

        Ok(UploadResponse {
            status: "success".to_string(),
            content_id: format!("c-{}", file.name),
            title: Some(file.name.clone()),
            processing_status: Some("processing".to_string()),
            chunks_created: Some(0),
            file_size: Some(total),
            message: None,
        })
    }

    async fn status(&self, content_id: &str) -> Result<StatusResponse, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts.entry(content_id.to_string()).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match step {
            Some(Step::Status(mut response)) => {
                response.content_id = content_id.to_string();
                Ok(response)
            }
            Some(Step::Fail) => Err(ApiError::Status {
                status: 503,
                message: "status service unavailable".to_string(),
            }),
            None => Err(ApiError::Status {
                status: 404,
                message: "File not found".to_string(),
            }),
        }
    }
}
