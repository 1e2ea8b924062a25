//! Drives batches of files through admission, upload and status polling.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::api::{ByteProgress, IngestApi};
use crate::config::ClientConfig;
use crate::error::{AdmissionError, RetryError, StateError};
use crate::upload::admission::{AdmissionPolicy, Admitted, SchedulingPolicy};
use crate::upload::events::{BatchSummary, UploadEvent};
use crate::upload::job::{
    FailureKind, JobPatch, JobPhase, UploadFile, UploadJob, UPLOAD_PROGRESS_SHARE,
};
use crate::upload::poller::{PollOutcome, PollPolicy, PollerHandle, StatusPoller};
use crate::upload::store::UploadStateStore;

/// Result of a submitted batch: the summary plus one handle per started poller.
#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub pollers: Vec<PollerHandle>,
}

impl BatchReport {
    /// Waits for every poller of the batch, returning each job's outcome.
    pub async fn join_pollers(self) -> Vec<(String, PollOutcome)> {
        let mut outcomes = Vec::with_capacity(self.pollers.len());
        for poller in self.pollers {
            let job_id = poller.job_id.clone();
            outcomes.push((job_id, poller.join().await));
        }
        outcomes
    }
}

struct FileResult {
    job_id: String,
    uploaded: bool,
    poller: Option<PollerHandle>,
}

#[derive(Clone)]
pub struct UploadCoordinator {
    api: Arc<dyn IngestApi>,
    store: Arc<UploadStateStore>,
    admission: AdmissionPolicy,
    scheduling: SchedulingPolicy,
    poller: StatusPoller,
}

impl UploadCoordinator {
    pub fn new(
        api: Arc<dyn IngestApi>,
        store: Arc<UploadStateStore>,
        config: &ClientConfig,
    ) -> Self {
        Self::with_policies(
            api,
            store,
            AdmissionPolicy::new(&config.admission),
            SchedulingPolicy::new(&config.scheduling),
            PollPolicy::new(&config.polling),
        )
    }

    pub fn with_policies(
        api: Arc<dyn IngestApi>,
        store: Arc<UploadStateStore>,
        admission: AdmissionPolicy,
        scheduling: SchedulingPolicy,
        poll_policy: PollPolicy,
    ) -> Self {
        let poller = StatusPoller::new(api.clone(), store.clone(), poll_policy);
        Self {
            api,
            store,
            admission,
            scheduling,
            poller,
        }
    }

    pub fn store(&self) -> &Arc<UploadStateStore> {
        &self.store
    }

    /// Admits a batch and uploads it window by window. Admission failures
    /// reject the whole batch before any job is created or request is sent;
    /// per-file failures are recorded on the job and do not stop the batch.
    pub async fn submit(&self, files: Vec<UploadFile>) -> Result<BatchReport, AdmissionError> {
        let Admitted { files, dropped } = match self.admission.admit(files) {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!("Batch rejected: {}", e);
                return Err(e);
            }
        };

        let concurrency = self.scheduling.concurrency(&files);
        info!(
            files = files.len(),
            dropped, concurrency, "Submitting upload batch"
        );

        let mut summary = BatchSummary {
            admitted: files.len(),
            dropped,
            ..Default::default()
        };
        let mut pollers = Vec::new();

        for (index, window) in files.chunks(concurrency).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.scheduling.window_delay()).await;
            }
            debug!(window = index, size = window.len(), "Starting upload window");

            let results = join_all(window.iter().map(|file| self.upload_one(file))).await;
            for result in results {
                summary.job_ids.push(result.job_id);
                if result.uploaded {
                    summary.uploaded += 1;
                } else {
                    summary.failed += 1;
                }
                pollers.extend(result.poller);
            }
        }

        info!(
            uploaded = summary.uploaded,
            failed = summary.failed,
            "Upload batch finished"
        );
        self.store.events().send(UploadEvent::BatchFinished {
            summary: summary.clone(),
        });

        Ok(BatchReport { summary, pollers })
    }

    async fn upload_one(&self, file: &UploadFile) -> FileResult {
        let job = UploadJob::new(file);
        let job_id = job.id.clone();
        let span = info_span!("upload", job_id = %job_id, file = %file.name);

        async {
            if let Err(e) = self.store.add(job) {
                warn!("Could not register upload job: {}", e);
                return FileResult {
                    job_id: job_id.clone(),
                    uploaded: false,
                    poller: None,
                };
            }

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ByteProgress>();
            let upload = self.api.upload(file, progress_tx);
            tokio::pin!(upload);

            let mut reported = 0u8;
            let result = loop {
                tokio::select! {
                    biased;
                    Some(progress) = progress_rx.recv() => {
                        let percent = upload_percent(progress);
                        if percent > reported {
                            reported = percent;
                            let patch = JobPatch::progress(percent);
                            if let Err(e) = self.store.update(&job_id, patch) {
                                debug!("Dropping upload progress: {}", e);
                            }
                        }
                    }
                    result = &mut upload => break result,
                }
            };

            let response = match result {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    let message = response
                        .message
                        .unwrap_or_else(|| format!("Upload returned status '{}'", response.status));
                    self.mark_failed(&job_id, message);
                    return FileResult {
                        job_id: job_id.clone(),
                        uploaded: false,
                        poller: None,
                    };
                }
                Err(e) => {
                    self.mark_failed(&job_id, e.to_string());
                    return FileResult {
                        job_id: job_id.clone(),
                        uploaded: false,
                        poller: None,
                    };
                }
            };

            let poller = match self
                .store
                .update(&job_id, JobPatch::uploaded(response.content_id.clone()))
            {
                Ok(_) => self.poller.spawn(&job_id, &response.content_id),
                Err(e) => {
                    debug!("Upload finished for a job no longer tracked: {}", e);
                    None
                }
            };

            FileResult {
                job_id: job_id.clone(),
                uploaded: true,
                poller,
            }
        }
        .instrument(span)
        .await
    }

    fn mark_failed(&self, job_id: &str, message: String) {
        warn!("Upload failed: {}", message);
        match self
            .store
            .update(job_id, JobPatch::failed(FailureKind::Network, message))
        {
            Ok(_) | Err(StateError::UnknownJob(_)) => {}
            Err(e) => debug!("Could not record upload failure: {}", e),
        }
    }

    /// Retries a failed job. Jobs that failed during upload or processing
    /// need the file again; jobs that lost contact with the status endpoint
    /// resume polling with the backend id they already have.
    pub fn retry(&self, job_id: &str) -> Result<PollerHandle, RetryError> {
        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| RetryError::UnknownJob(job_id.to_string()))?;

        if job.phase != JobPhase::Failed {
            return Err(RetryError::NotFailed {
                id: job.id,
                phase: job.phase,
            });
        }

        let kind = job.error.as_ref().map(|e| e.kind);
        let content_id = match (kind, job.backend_job_id) {
            (Some(FailureKind::StatusQuery), Some(content_id)) => content_id,
            _ => {
                return Err(RetryError::ReselectFile {
                    id: job.id,
                    file_name: job.file_name,
                })
            }
        };

        self.store
            .update(
                job_id,
                JobPatch::retry(JobPhase::Classifying, UPLOAD_PROGRESS_SHARE),
            )
            .map_err(|e| RetryError::State(job_id.to_string(), e))?;
        info!(job_id = %job_id, content_id = %content_id, "Resuming status polling");

        self.poller
            .spawn(job_id, &content_id)
            .ok_or_else(|| RetryError::UnknownJob(job_id.to_string()))
    }
}

/// Maps upload progress into the upload share of the job's progress.
fn upload_percent(progress: ByteProgress) -> u8 {
    (progress.fraction() * f64::from(UPLOAD_PROGRESS_SHARE)).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClassificationStatus, ParsingStatus};
    use crate::config::AdmissionConfig;
    use crate::upload::testing::{completed_with, status, ScriptedApi, Step};
    use std::time::Duration;
    use tokio::time::Instant;

    const MIB: u64 = 1024 * 1024;

    fn file(name: &str, size_bytes: u64) -> UploadFile {
        UploadFile::new(format!("/tmp/{}", name), name, size_bytes)
    }

    fn coordinator(api: Arc<ScriptedApi>) -> UploadCoordinator {
        UploadCoordinator::new(
            api,
            Arc::new(UploadStateStore::default()),
            &ClientConfig::default(),
        )
    }

    #[test]
    fn test_upload_percent_band() {
        assert_eq!(upload_percent(ByteProgress { sent: 0, total: 100 }), 0);
        assert_eq!(upload_percent(ByteProgress { sent: 50, total: 100 }), 15);
        assert_eq!(upload_percent(ByteProgress { sent: 100, total: 100 }), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_files_rejected_without_side_effects() {
        let api = Arc::new(ScriptedApi::new());
        let coordinator = coordinator(api.clone());
        let files = (0..6).map(|i| file(&format!("{}.txt", i), 10)).collect();

        let err = coordinator.submit(files).await.unwrap_err();
        assert!(matches!(err, AdmissionError::TooManyFiles { count: 6, max: 5, .. }));
        assert_eq!(api.uploads(), 0);
        assert!(coordinator.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_file_rejected_without_side_effects() {
        let api = Arc::new(ScriptedApi::new());
        let coordinator = coordinator(api.clone());

        let err = coordinator
            .submit(vec![file("scan.pdf", 25 * MIB)])
            .await
            .unwrap_err();
        assert_eq!(err.files(), ["scan.pdf".to_string()]);
        assert_eq!(api.uploads(), 0);
        assert!(coordinator.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_upload_lifecycle() {
        let api = Arc::new(ScriptedApi::new());
        api.script(
            "c-report.pdf",
            vec![
                status(ParsingStatus::Parsing, ClassificationStatus::Pending, false),
                status(ParsingStatus::Completed, ClassificationStatus::QuickDone, false),
                completed_with(&["Work", "Finance"]),
            ],
        );
        let coordinator = coordinator(api.clone());
        let mut rx = coordinator.store().subscribe();

        let report = coordinator
            .submit(vec![file("report.pdf", 4096)])
            .await
            .unwrap();
        assert_eq!(report.summary.admitted, 1);
        assert_eq!(report.summary.uploaded, 1);
        assert_eq!(report.pollers.len(), 1);
        let job_id = report.summary.job_ids[0].clone();

        let outcomes = report.join_pollers().await;
        assert_eq!(outcomes, vec![(job_id.clone(), PollOutcome::Completed)]);

        let mut history = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UploadEvent::JobUpdated { job } = event {
                if job.phase != JobPhase::Completed {
                    assert!(job.categories.is_empty());
                }
                history.push((job.phase, job.progress_percent));
            }
        }

        assert_eq!(history.first(), Some(&(JobPhase::Uploading, 15)));
        assert!(history.contains(&(JobPhase::Parsing, 30)));
        assert!(history.contains(&(JobPhase::Classifying, 70)));
        assert_eq!(history.last(), Some(&(JobPhase::Completed, 100)));
        assert!(history.windows(2).all(|w| w[0].1 <= w[1].1));

        let job = coordinator.store().get(&job_id).unwrap();
        assert_eq!(job.backend_job_id.as_deref(), Some("c-report.pdf"));
        assert_eq!(job.categories.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_is_isolated() {
        let api = Arc::new(ScriptedApi::new());
        api.fail_upload("broken.pdf");
        api.script("c-good.pdf", vec![completed_with(&["Work"])]);
        let coordinator = coordinator(api.clone());

        let report = coordinator
            .submit(vec![file("broken.pdf", 100), file("good.pdf", 100)])
            .await
            .unwrap();
        assert_eq!(report.summary.uploaded, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.pollers.len(), 1);
        let job_ids = report.summary.job_ids.clone();

        let failed = coordinator.store().get(&job_ids[0]).unwrap();
        assert_eq!(failed.phase, JobPhase::Failed);
        assert_eq!(failed.error.as_ref().unwrap().kind, FailureKind::Network);
        assert!(failed.backend_job_id.is_none());

        report.join_pollers().await;
        let good = coordinator.store().get(&job_ids[1]).unwrap();
        assert_eq!(good.phase, JobPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_files_counted() {
        let api = Arc::new(ScriptedApi::new());
        api.script("c-a.txt", vec![completed_with(&[])]);
        let coordinator = coordinator(api.clone());

        let report = coordinator
            .submit(vec![file("a.txt", 10), file("b.exe", 10)])
            .await
            .unwrap();
        assert_eq!(report.summary.admitted, 1);
        assert_eq!(report.summary.dropped, 1);
        assert_eq!(api.uploads(), 1);
        report.join_pollers().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_are_paced() {
        let api = Arc::new(ScriptedApi::new());
        let config = ClientConfig {
            admission: AdmissionConfig {
                max_files: 20,
                ..Default::default()
            },
            ..Default::default()
        };
        let coordinator = UploadCoordinator::new(
            api.clone(),
            Arc::new(UploadStateStore::default()),
            &config,
        );

        // Small files: five per window, so eleven files make three windows.
        let files = (0..11).map(|i| file(&format!("{}.md", i), 10)).collect();
        let started = Instant::now();
        let report = coordinator.submit(files).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert_eq!(report.summary.job_ids.len(), 11);
        assert_eq!(api.uploads(), 11);

        let names: Vec<String> = coordinator
            .store()
            .get_all()
            .into_iter()
            .map(|j| j.file_name)
            .collect();
        let expected: Vec<String> = (0..11).map(|i| format!("{}.md", i)).collect();
        assert_eq!(names, expected);

        for id in &report.summary.job_ids {
            coordinator.store().remove(id);
        }
        report.join_pollers().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_network_failure_needs_file() {
        let api = Arc::new(ScriptedApi::new());
        api.fail_upload("broken.pdf");
        let coordinator = coordinator(api);

        let report = coordinator
            .submit(vec![file("broken.pdf", 100)])
            .await
            .unwrap();
        let job_id = &report.summary.job_ids[0];

        match coordinator.retry(job_id) {
            Err(RetryError::ReselectFile { file_name, .. }) => assert_eq!(file_name, "broken.pdf"),
            other => panic!("unexpected retry result {:?}", other.map(|h| h.job_id)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_status_query_failure_resumes_polling() {
        let api = Arc::new(ScriptedApi::new());
        api.script(
            "c-report.pdf",
            vec![
                Step::Fail,
                Step::Fail,
                Step::Fail,
                Step::Fail,
                Step::Fail,
                completed_with(&["Work"]),
            ],
        );
        let coordinator = coordinator(api.clone());

        let report = coordinator
            .submit(vec![file("report.pdf", 4096)])
            .await
            .unwrap();
        let job_id = report.summary.job_ids[0].clone();
        report.join_pollers().await;

        let failed = coordinator.store().get(&job_id).unwrap();
        assert_eq!(failed.error.unwrap().kind, FailureKind::StatusQuery);

        let handle = coordinator.retry(&job_id).unwrap();
        let job = coordinator.store().get(&job_id).unwrap();
        assert_eq!(job.phase, JobPhase::Classifying);
        assert_eq!(job.progress_percent, 30);
        assert!(job.error.is_none());

        assert_eq!(handle.join().await, PollOutcome::Completed);
        let job = coordinator.store().get(&job_id).unwrap();
        assert_eq!(job.phase, JobPhase::Completed);
        assert_eq!(job.backend_job_id.as_deref(), Some("c-report.pdf"));
        assert_eq!(coordinator.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rejects_active_and_unknown_jobs() {
        let api = Arc::new(ScriptedApi::new());
        api.script(
            "c-report.pdf",
            vec![status(ParsingStatus::Parsing, ClassificationStatus::Pending, false)],
        );
        let coordinator = coordinator(api);

        let report = coordinator
            .submit(vec![file("report.pdf", 4096)])
            .await
            .unwrap();
        let job_id = report.summary.job_ids[0].clone();

        assert!(matches!(
            coordinator.retry(&job_id),
            Err(RetryError::NotFailed { phase: JobPhase::Parsing, .. })
        ));
        assert!(matches!(
            coordinator.retry("missing"),
            Err(RetryError::UnknownJob(_))
        ));

        coordinator.store().remove(&job_id);
        assert_eq!(
            report.join_pollers().await,
            vec![(job_id, PollOutcome::Cancelled)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_finished_event() {
        let api = Arc::new(ScriptedApi::new());
        api.fail_upload("a.txt");
        let coordinator = coordinator(api);
        let mut rx = coordinator.store().subscribe();

        coordinator.submit(vec![file("a.txt", 1)]).await.unwrap();

        let mut summary = None;
        while let Ok(event) = rx.try_recv() {
            if let UploadEvent::BatchFinished { summary: s } = event {
                summary = Some(s);
            }
        }
        let summary = summary.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.job_ids.len(), 1);
    }
}
