use std::path::PathBuf;
use thiserror::Error;

use crate::upload::job::JobPhase;

#[derive(Error, Debug)]
pub enum PkbError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Retry error: {0}")]
    Retry(#[from] RetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Returns true when the failure happened before or during transport,
    /// as opposed to a well-formed error answer from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Http(_) | ApiError::ReadFile { .. })
    }
}

/// A batch violated a client-side admission limit. No network call was made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Too many files: {count} submitted, at most {max} allowed ({})", .files.join(", "))]
    TooManyFiles {
        count: usize,
        max: usize,
        files: Vec<String>,
    },

    #[error("Files exceed the {max_bytes} byte limit: {}", .files.join(", "))]
    FileTooLarge { max_bytes: u64, files: Vec<String> },

    #[error("Batch of {total_bytes} bytes exceeds the {max_bytes} byte limit ({})", .files.join(", "))]
    BatchTooLarge {
        total_bytes: u64,
        max_bytes: u64,
        files: Vec<String>,
    },
}

impl AdmissionError {
    /// Names of the files the violation was attributed to.
    pub fn files(&self) -> &[String] {
        match self {
            AdmissionError::TooManyFiles { files, .. }
            | AdmissionError::FileTooLarge { files, .. }
            | AdmissionError::BatchTooLarge { files, .. } => files,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Unknown upload job '{0}'")]
    UnknownJob(String),

    #[error("Upload job '{0}' already exists")]
    DuplicateJob(String),

    #[error("Job '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobPhase,
        to: JobPhase,
    },

    #[error("Job '{id}' already has backend id '{existing}'")]
    BackendIdAlreadySet { id: String, existing: String },

    #[error("Job '{0}' can only carry categories once completed")]
    CategoriesOutsideCompleted(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("Unknown upload job '{0}'")]
    UnknownJob(String),

    #[error("Job '{id}' is {phase}, only failed jobs can be retried")]
    NotFailed { id: String, phase: JobPhase },

    #[error("The upload of '{file_name}' has to be restarted: re-select the file")]
    ReselectFile { id: String, file_name: String },

    #[error("Retry of job '{0}' rejected: {1}")]
    State(String, StateError),
}

pub type Result<T> = std::result::Result<T, PkbError>;
