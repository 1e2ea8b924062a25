//! Upload event broadcaster for streaming store changes to observers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::upload::job::UploadJob;

/// Advisory result of one submitted batch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Files that passed admission and were scheduled.
    pub admitted: usize,
    /// Files dropped for an unaccepted extension.
    pub dropped: usize,
    /// Uploads accepted by the backend.
    pub uploaded: usize,
    /// Uploads that failed.
    pub failed: usize,
    /// Ids of the jobs created for this batch, in submission order.
    pub job_ids: Vec<String>,
}

/// Change notification emitted by the upload state store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UploadEvent {
    JobAdded { job: UploadJob },
    JobUpdated { job: UploadJob },
    #[serde(rename_all = "camelCase")]
    JobRemoved { job_id: String },
    /// A classification finished; aggregate views (collection counts) are stale.
    #[serde(rename_all = "camelCase")]
    CollectionsChanged { job_id: String },
    BatchFinished { summary: BatchSummary },
}

impl UploadEvent {
    /// Id of the job the event concerns, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            UploadEvent::JobAdded { job } | UploadEvent::JobUpdated { job } => Some(&job.id),
            UploadEvent::JobRemoved { job_id } | UploadEvent::CollectionsChanged { job_id } => {
                Some(job_id)
            }
            UploadEvent::BatchFinished { .. } => None,
        }
    }
}

/// Broadcasts upload events to every subscriber.
#[derive(Clone)]
pub struct UploadEventBroadcaster {
    sender: Arc<broadcast::Sender<UploadEvent>>,
}

impl UploadEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: UploadEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }
}

impl Default for UploadEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
