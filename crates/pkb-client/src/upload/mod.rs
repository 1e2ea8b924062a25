pub mod admission;
pub mod coordinator;
pub mod events;
pub mod job;
pub mod poller;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionPolicy, Admitted, SchedulingPolicy};
pub use coordinator::{BatchReport, UploadCoordinator};
pub use events::{BatchSummary, UploadEvent, UploadEventBroadcaster};
pub use job::{
    Category, FailureKind, JobError, JobPatch, JobPhase, UploadFile, UploadJob,
    UPLOAD_PROGRESS_SHARE,
};
pub use poller::{
    translate, PollOutcome, PollPolicy, PollTier, PollerHandle, StatusPoller, STATUS_TRANSITIONS,
};
pub use store::{PhaseCounts, PollerLease, UploadStateStore};
