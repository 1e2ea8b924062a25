//! In-memory store of upload jobs, observed by presentation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::StateError;
use crate::upload::events::{UploadEvent, UploadEventBroadcaster};
use crate::upload::job::{JobPatch, JobPhase, UploadJob};

/// Number of jobs per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCounts {
    pub uploading: usize,
    pub parsing: usize,
    pub classifying: usize,
    pub completed: usize,
    pub failed: usize,
}

impl PhaseCounts {
    pub fn total(&self) -> usize {
        self.uploading + self.parsing + self.classifying + self.completed + self.failed
    }

    /// Jobs not yet completed or failed.
    pub fn in_progress(&self) -> usize {
        self.uploading + self.parsing + self.classifying
    }
}

/// Authoritative list of upload jobs.
///
/// Mutations go through `add`, `update`, `remove` and `clear_completed`, each
/// serialized by the jobs lock and announced on the event channel. The store
/// also owns the cancellation token of every running poller so that removing
/// a job stops its poll loop.
pub struct UploadStateStore {
    jobs: RwLock<Vec<UploadJob>>,
    pollers: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
    events: UploadEventBroadcaster,
}

impl UploadStateStore {
    pub fn new(events: UploadEventBroadcaster) -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            pollers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            events,
        }
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, Vec<UploadJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Upload store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, Vec<UploadJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Upload store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_pollers(&self) -> MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
        match self.pollers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Upload store poller lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn add(&self, job: UploadJob) -> Result<(), StateError> {
        {
            let mut jobs = self.write_jobs();
            if jobs.iter().any(|j| j.id == job.id) {
                return Err(StateError::DuplicateJob(job.id));
            }
            jobs.push(job.clone());
        }
        log::debug!("Added upload job {} ({})", job.id, job.file_name);
        self.events.send(UploadEvent::JobAdded { job });
        Ok(())
    }

    /// Applies a patch and returns the updated job.
    pub fn update(&self, id: &str, patch: JobPatch) -> Result<UploadJob, StateError> {
        let updated = {
            let mut jobs = self.write_jobs();
            let job = jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or_else(|| StateError::UnknownJob(id.to_string()))?;
            job.apply(patch)?;
            job.clone()
        };
        self.events.send(UploadEvent::JobUpdated {
            job: updated.clone(),
        });
        Ok(updated)
    }

    /// Removes a job and cancels its poller, if one is running.
    pub fn remove(&self, id: &str) -> Option<UploadJob> {
        let removed = {
            let mut jobs = self.write_jobs();
            let index = jobs.iter().position(|j| j.id == id)?;
            jobs.remove(index)
        };

        if let Some((_, token)) = self.lock_pollers().remove(id) {
            log::debug!("Cancelling poller of removed job {}", id);
            token.cancel();
        }

        self.events.send(UploadEvent::JobRemoved {
            job_id: id.to_string(),
        });
        Some(removed)
    }

    /// Removes all completed jobs. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let removed: Vec<String> = {
            let mut jobs = self.write_jobs();
            let ids = jobs
                .iter()
                .filter(|j| j.phase == JobPhase::Completed)
                .map(|j| j.id.clone())
                .collect();
            jobs.retain(|j| j.phase != JobPhase::Completed);
            ids
        };

        if !removed.is_empty() {
            let mut pollers = self.lock_pollers();
            for id in &removed {
                if let Some((_, token)) = pollers.remove(id) {
                    token.cancel();
                }
            }
        }

        for id in &removed {
            self.events.send(UploadEvent::JobRemoved { job_id: id.clone() });
        }
        removed.len()
    }

    pub fn get(&self, id: &str) -> Option<UploadJob> {
        self.read_jobs().iter().find(|j| j.id == id).cloned()
    }

    /// Returns all jobs in insertion order.
    pub fn get_all(&self) -> Vec<UploadJob> {
        self.read_jobs().clone()
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_jobs().is_empty()
    }

    pub fn counts(&self) -> PhaseCounts {
        let jobs = self.read_jobs();
        let mut counts = PhaseCounts::default();
        for job in jobs.iter() {
            match job.phase {
                JobPhase::Uploading => counts.uploading += 1,
                JobPhase::Parsing => counts.parsing += 1,
                JobPhase::Classifying => counts.classifying += 1,
                JobPhase::Completed => counts.completed += 1,
                JobPhase::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Unweighted mean of all jobs' progress; 0 for an empty store.
    pub fn overall_progress(&self) -> f64 {
        let jobs = self.read_jobs();
        if jobs.is_empty() {
            return 0.0;
        }
        let sum: u64 = jobs.iter().map(|j| u64::from(j.progress_percent)).sum();
        sum as f64 / jobs.len() as f64
    }

    /// Registers a poller for a job and returns its lease.
    /// A poller already registered for the job is cancelled first.
    /// Returns `None` if the job is not in the store.
    pub fn register_poller(&self, id: &str) -> Option<PollerLease> {
        self.get(id)?;
        let lease = PollerLease {
            job_id: id.to_string(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        let previous = self
            .lock_pollers()
            .insert(id.to_string(), (lease.generation, lease.token.clone()));
        if let Some((_, token)) = previous {
            log::debug!("Replacing running poller of job {}", id);
            token.cancel();
        }
        Some(lease)
    }

    /// Drops the registration of a finished poller, unless it was replaced.
    pub fn finish_poller(&self, lease: &PollerLease) {
        let mut pollers = self.lock_pollers();
        let is_current = pollers
            .get(&lease.job_id)
            .map(|(generation, _)| *generation == lease.generation)
            .unwrap_or(false);
        if is_current {
            pollers.remove(&lease.job_id);
        }
    }

    pub fn has_active_poller(&self, id: &str) -> bool {
        self.lock_pollers()
            .get(id)
            .map(|(_, token)| !token.is_cancelled())
            .unwrap_or(false)
    }

    pub fn events(&self) -> &UploadEventBroadcaster {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }
}

impl Default for UploadStateStore {
    fn default() -> Self {
        Self::new(UploadEventBroadcaster::default())
    }
}

/// A poller's registration in the store.
#[derive(Debug, Clone)]
pub struct PollerLease {
    job_id: String,
    generation: u64,
    token: CancellationToken,
}

impl PollerLease {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
