//! Per-job status polling and translation of backend states into phases.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::api::{ClassificationStatus, IngestApi, ParsingStatus, StatusResponse};
use crate::config::{PollTierConfig, PollingConfig};
use crate::error::StateError;
use crate::upload::events::UploadEvent;
use crate::upload::job::{Category, FailureKind, JobPatch, JobPhase};
use crate::upload::store::{PollerLease, UploadStateStore};

/// Confidence assumed for a category the backend reported without one.
const DEFAULT_CATEGORY_CONFIDENCE: f64 = 0.8;

const TIMEOUT_ADVISORY: &str =
    "Processing is taking longer than expected. The backend keeps working on it.";

/// Polling budget of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTier {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollTier {
    /// Longest time a poller with this tier can run.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl From<PollTierConfig> for PollTier {
    fn from(config: PollTierConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    image: PollTier,
    large_file: PollTier,
    default: PollTier,
    large_file_threshold_bytes: u64,
    max_consecutive_failures: u32,
    image_extensions: HashSet<String>,
}

impl PollPolicy {
    pub fn new(config: &PollingConfig) -> Self {
        Self {
            image: config.image.into(),
            large_file: config.large_file.into(),
            default: config.default.into(),
            large_file_threshold_bytes: config.large_file_threshold_bytes,
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            image_extensions: config
                .image_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Images poll fast and briefly, large files slowly and long.
    pub fn tier_for(&self, file_name: &str, size_bytes: u64) -> PollTier {
        let extension = std::path::Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        if extension
            .map(|ext| self.image_extensions.contains(&ext))
            .unwrap_or(false)
        {
            self.image
        } else if size_bytes > self.large_file_threshold_bytes {
            self.large_file
        } else {
            self.default
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(&PollingConfig::default())
    }
}

/// Matcher for one column of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Any,
    Is(T),
}

impl<T: PartialEq> Field<T> {
    fn matches(&self, value: &T) -> bool {
        match self {
            Field::Any => true,
            Field::Is(expected) => expected == value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub parsing: Field<ParsingStatus>,
    pub classification: Field<ClassificationStatus>,
    pub show_classification: Field<bool>,
    pub phase: JobPhase,
    pub progress_percent: u8,
}

impl TransitionRule {
    pub fn matches(&self, status: &StatusResponse) -> bool {
        self.parsing.matches(&status.parsing_status)
            && self.classification.matches(&status.classification_status)
            && self.show_classification.matches(&status.show_classification)
    }
}

/// Evaluated top to bottom, first match wins.
pub const STATUS_TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        parsing: Field::Any,
        classification: Field::Is(ClassificationStatus::Completed),
        show_classification: Field::Is(true),
        phase: JobPhase::Completed,
        progress_percent: 100,
    },
    TransitionRule {
        parsing: Field::Is(ParsingStatus::Parsing),
        classification: Field::Any,
        show_classification: Field::Any,
        phase: JobPhase::Parsing,
        progress_percent: 35,
    },
    TransitionRule {
        parsing: Field::Is(ParsingStatus::Completed),
        classification: Field::Is(ClassificationStatus::QuickProcessing),
        show_classification: Field::Is(false),
        phase: JobPhase::Classifying,
        progress_percent: 60,
    },
    TransitionRule {
        parsing: Field::Is(ParsingStatus::Completed),
        classification: Field::Is(ClassificationStatus::QuickDone),
        show_classification: Field::Is(false),
        phase: JobPhase::Classifying,
        progress_percent: 70,
    },
    TransitionRule {
        parsing: Field::Is(ParsingStatus::Completed),
        classification: Field::Is(ClassificationStatus::AiProcessing),
        show_classification: Field::Is(false),
        phase: JobPhase::Classifying,
        progress_percent: 85,
    },
    TransitionRule {
        parsing: Field::Is(ParsingStatus::Completed),
        classification: Field::Any,
        show_classification: Field::Is(false),
        phase: JobPhase::Classifying,
        progress_percent: 50,
    },
];

/// Translates a status answer into a job patch. The table decides first; a
/// backend error fails the job only when no row matches. `None` means the
/// status is not covered and the job stays as it is.
pub fn translate(status: &StatusResponse) -> Option<JobPatch> {
    if let Some(rule) = STATUS_TRANSITIONS.iter().find(|rule| rule.matches(status)) {
        if rule.phase == JobPhase::Completed {
            return Some(JobPatch::completed(categories(status)));
        }
        return Some(JobPatch::phase(rule.phase, rule.progress_percent));
    }

    let message = processing_error(status)?;
    Some(JobPatch::failed(FailureKind::Processing, message))
}

fn processing_error(status: &StatusResponse) -> Option<String> {
    let stage = if status.parsing_status == ParsingStatus::Error {
        "Parsing"
    } else if status.classification_status == ClassificationStatus::Error {
        "Classification"
    } else {
        return None;
    };

    Some(match status.message.as_deref().filter(|m| !m.trim().is_empty()) {
        Some(detail) => format!("{} failed: {}", stage, detail),
        None => format!("{} failed on the backend", stage),
    })
}

fn categories(status: &StatusResponse) -> Vec<Category> {
    status
        .categories
        .iter()
        .map(|hit| Category {
            name: hit.name.clone(),
            confidence: hit
                .confidence
                .unwrap_or(DEFAULT_CATEGORY_CONFIDENCE)
                .clamp(0.0, 1.0),
            role: hit.role.clone(),
            source: hit.source.clone(),
        })
        .collect()
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    /// Budget exhausted while the backend was still working.
    TimedOut,
    Cancelled,
    /// The job left the store while polling.
    Vanished,
    /// The poll task panicked.
    Aborted,
}

/// A spawned poll loop.
#[derive(Debug)]
pub struct PollerHandle {
    pub job_id: String,
    handle: JoinHandle<PollOutcome>,
}

impl PollerHandle {
    pub async fn join(self) -> PollOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %self.job_id, "Poll task ended abnormally: {}", e);
                PollOutcome::Aborted
            }
        }
    }
}

/// Polls the status endpoint for jobs and writes the results into the store.
#[derive(Clone)]
pub struct StatusPoller {
    api: Arc<dyn IngestApi>,
    store: Arc<UploadStateStore>,
    policy: PollPolicy,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn IngestApi>, store: Arc<UploadStateStore>, policy: PollPolicy) -> Self {
        Self { api, store, policy }
    }

    /// Registers a poller for the job and runs it on its own task. Returns
    /// `None` if the job is not in the store.
    pub fn spawn(&self, job_id: &str, content_id: &str) -> Option<PollerHandle> {
        let job = self.store.get(job_id)?;
        let lease = self.store.register_poller(job_id)?;
        let tier = self.policy.tier_for(&job.file_name, job.file_size_bytes);

        let poller = self.clone();
        let content_id = content_id.to_string();
        let span = info_span!("status_poll", job_id = %job_id, content_id = %content_id);
        let handle = tokio::spawn(
            async move {
                let outcome = poller.run(&lease, &content_id, tier).await;
                poller.store.finish_poller(&lease);
                outcome
            }
            .instrument(span),
        );

        Some(PollerHandle {
            job_id: job_id.to_string(),
            handle,
        })
    }

    /// Poll loop: each attempt sleeps one interval, then queries.
    pub async fn run(&self, lease: &PollerLease, content_id: &str, tier: PollTier) -> PollOutcome {
        let job_id = lease.job_id();
        let token = lease.token();
        let max_failures = self.policy.max_consecutive_failures;
        let mut consecutive_failures = 0u32;

        debug!(
            interval_ms = tier.interval.as_millis() as u64,
            max_attempts = tier.max_attempts,
            "Starting status polling"
        );

        for attempt in 1..=tier.max_attempts {
            tokio::select! {
                biased;
                _ = token.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(tier.interval) => {}
            }

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return PollOutcome::Cancelled,
                result = self.api.status(content_id) => result,
            };
            if token.is_cancelled() {
                return PollOutcome::Cancelled;
            }

            let status = match result {
                Ok(status) => {
                    consecutive_failures = 0;
                    status
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        attempt,
                        consecutive_failures, "Status query failed: {}", e
                    );
                    if consecutive_failures >= max_failures {
                        let message = format!(
                            "Status query failed {} times in a row: {}",
                            consecutive_failures, e
                        );
                        let patch = JobPatch::failed(FailureKind::StatusQuery, message);
                        return self.finish(job_id, patch);
                    }
                    continue;
                }
            };

            let Some(patch) = translate(&status) else {
                debug!(
                    attempt,
                    parsing = ?status.parsing_status,
                    classification = ?status.classification_status,
                    "Status not covered by the transition table"
                );
                continue;
            };

            match self.store.update(job_id, patch) {
                Ok(job) => match job.phase {
                    JobPhase::Completed => {
                        info!(categories = job.categories.len(), "Classification completed");
                        self.store
                            .events()
                            .send(UploadEvent::CollectionsChanged {
                                job_id: job_id.to_string(),
                            });
                        return PollOutcome::Completed;
                    }
                    JobPhase::Failed => {
                        warn!("Backend reported a processing error");
                        return PollOutcome::Failed;
                    }
                    _ => {}
                },
                Err(StateError::UnknownJob(_)) => return PollOutcome::Vanished,
                Err(e) => debug!(attempt, "Ignoring status update: {}", e),
            }
        }

        info!("Polling budget exhausted, leaving job in progress");
        match self.store.update(job_id, JobPatch::timed_out(TIMEOUT_ADVISORY)) {
            Ok(_) => PollOutcome::TimedOut,
            Err(StateError::UnknownJob(_)) => PollOutcome::Vanished,
            Err(e) => {
                debug!("Could not record timeout: {}", e);
                PollOutcome::TimedOut
            }
        }
    }

    fn finish(&self, job_id: &str, patch: JobPatch) -> PollOutcome {
        match self.store.update(job_id, patch) {
            Ok(_) => PollOutcome::Failed,
            Err(StateError::UnknownJob(_)) => PollOutcome::Vanished,
            Err(e) => {
                debug!("Could not record failure: {}", e);
                PollOutcome::Failed
            }
        }
    }
}
