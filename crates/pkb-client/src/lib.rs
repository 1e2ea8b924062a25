pub mod api;
pub mod collections;
pub mod config;
pub mod error;
pub mod qa;
pub mod upload;

pub use api::{ApiClient, ByteProgress, IngestApi, SearchRequest, StatusResponse};
pub use collections::{Collection, CollectionsClient};
pub use config::{load_config, load_config_or_default, ClientConfig};
pub use error::{
    AdmissionError, ApiError, ConfigError, PkbError, Result, RetryError, StateError,
};
pub use qa::{Feedback, QaClient, QaSession};
pub use upload::{
    BatchReport, BatchSummary, JobPhase, PollOutcome, UploadCoordinator, UploadEvent,
    UploadEventBroadcaster, UploadFile, UploadJob, UploadStateStore,
};
