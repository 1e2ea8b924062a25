//! Upload job records and the rules for mutating them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Upload is the first 30% of the work; the backend owns the rest.
pub const UPLOAD_PROGRESS_SHARE: u8 = 30;

/// A local file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
}

impl UploadFile {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            size_bytes,
        }
    }

    /// Builds an upload file from filesystem metadata.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        Ok(Self::new(path, name, metadata.len()))
    }

    /// Lowercased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Client-side coarse status of an upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Uploading,
    Parsing,
    Classifying,
    Completed,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Uploading => write!(f, "Uploading"),
            JobPhase::Parsing => write!(f, "Parsing"),
            JobPhase::Classifying => write!(f, "Classifying"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl JobPhase {
    /// Position in the forward order. Completed and Failed share the last rank.
    fn rank(self) -> u8 {
        match self {
            JobPhase::Uploading => 0,
            JobPhase::Parsing => 1,
            JobPhase::Classifying => 2,
            JobPhase::Completed | JobPhase::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// Failure classification, used to pick a retry strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The upload call itself failed.
    Network,
    /// Status polling failed repeatedly; the backend job id is known.
    StatusQuery,
    /// The backend reported a parsing or classification error.
    Processing,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::StatusQuery => write!(f, "status-query"),
            FailureKind::Processing => write!(f, "processing"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    /// Confidence in 0.0..=1.0.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One submitted file and its progress through upload and classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    pub id: String,
    pub file_name: String,
    pub file_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_job_id: Option<String>,
    pub phase: JobPhase,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Set when polling gave up while the backend was still working.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(file: &UploadFile) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file.name.clone(),
            file_size_bytes: file.size_bytes,
            backend_job_id: None,
            phase: JobPhase::Uploading,
            progress_percent: 0,
            categories: Vec::new(),
            error: None,
            advisory: None,
            created_at: Utc::now(),
        }
    }

    /// Applies a patch, enforcing the record's invariants. On error the job
    /// is left unchanged.
    pub fn apply(&mut self, patch: JobPatch) -> Result<(), StateError> {
        let target_phase = patch.phase.unwrap_or(self.phase);

        if patch.retry {
            if self.phase != JobPhase::Failed || target_phase.is_terminal() {
                return Err(self.invalid_transition(target_phase));
            }
        } else if patch.phase.is_some() {
            let backwards = target_phase.rank() < self.phase.rank();
            let leaves_terminal = self.phase.is_terminal() && target_phase != self.phase;
            if backwards || leaves_terminal {
                return Err(self.invalid_transition(target_phase));
            }
        } else if self.phase.is_terminal()
            && (patch.progress_percent.is_some() || patch.advisory.is_some())
        {
            return Err(self.invalid_transition(target_phase));
        }

        if patch.categories.is_some() && target_phase != JobPhase::Completed {
            return Err(StateError::CategoriesOutsideCompleted(self.id.clone()));
        }

        if let (Some(existing), Some(new_id)) = (&self.backend_job_id, &patch.backend_job_id) {
            if existing != new_id {
                return Err(StateError::BackendIdAlreadySet {
                    id: self.id.clone(),
                    existing: existing.clone(),
                });
            }
        }

        // Validation done, mutate.
        if patch.backend_job_id.is_some() && self.backend_job_id.is_none() {
            self.backend_job_id = patch.backend_job_id;
        }

        if patch.retry {
            self.phase = target_phase;
            self.progress_percent = patch.progress_percent.unwrap_or(0).min(100);
            self.error = None;
            self.advisory = None;
            self.categories.clear();
            return Ok(());
        }

        self.phase = target_phase;
        if let Some(progress) = patch.progress_percent {
            self.progress_percent = self.progress_percent.max(progress.min(100));
        }
        match self.phase {
            JobPhase::Completed => {
                self.progress_percent = 100;
                self.advisory = None;
                if let Some(categories) = patch.categories {
                    self.categories = categories;
                }
            }
            JobPhase::Failed => {
                self.categories.clear();
                if patch.error.is_some() {
                    self.error = patch.error;
                }
            }
            _ => {
                if let Some(advisory) = patch.advisory {
                    self.advisory = Some(advisory);
                }
            }
        }

        Ok(())
    }

    fn invalid_transition(&self, to: JobPhase) -> StateError {
        StateError::InvalidTransition {
            id: self.id.clone(),
            from: self.phase,
            to,
        }
    }
}

/// A change to an [`UploadJob`]. Built through the named constructors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub phase: Option<JobPhase>,
    pub progress_percent: Option<u8>,
    pub backend_job_id: Option<String>,
    pub categories: Option<Vec<Category>>,
    pub error: Option<JobError>,
    pub advisory: Option<String>,
    /// Allows leaving `Failed` and lowering progress.
    pub retry: bool,
}

impl JobPatch {
    pub fn progress(progress_percent: u8) -> Self {
        Self {
            progress_percent: Some(progress_percent),
            ..Default::default()
        }
    }

    pub fn phase(phase: JobPhase, progress_percent: u8) -> Self {
        Self {
            phase: Some(phase),
            progress_percent: Some(progress_percent),
            ..Default::default()
        }
    }

    /// Upload accepted by the backend: `Parsing` at the end of the upload band.
    pub fn uploaded(backend_job_id: impl Into<String>) -> Self {
        Self {
            phase: Some(JobPhase::Parsing),
            progress_percent: Some(UPLOAD_PROGRESS_SHARE),
            backend_job_id: Some(backend_job_id.into()),
            ..Default::default()
        }
    }

    pub fn completed(categories: Vec<Category>) -> Self {
        Self {
            phase: Some(JobPhase::Completed),
            progress_percent: Some(100),
            categories: Some(categories),
            ..Default::default()
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            phase: Some(JobPhase::Failed),
            error: Some(JobError {
                kind,
                message: message.into(),
            }),
            ..Default::default()
        }
    }

    /// Polling budget exhausted while the backend is still processing.
    pub fn timed_out(advisory: impl Into<String>) -> Self {
        Self {
            phase: Some(JobPhase::Classifying),
            progress_percent: Some(95),
            advisory: Some(advisory.into()),
            ..Default::default()
        }
    }

    pub fn retry(phase: JobPhase, progress_percent: u8) -> Self {
        Self {
            phase: Some(phase),
            progress_percent: Some(progress_percent),
            retry: true,
            ..Default::default()
        }
    }
}
