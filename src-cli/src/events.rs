//! Event bridge between the upload store and the terminal.

use std::collections::HashMap;

use log::{debug, info, warn};
use pkb_client::api::CategoryStats;
use pkb_client::{ApiClient, JobPhase, UploadEvent, UploadJob, UploadStateStore};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Running bridge task. Dropping it leaves the task running until the
/// store's broadcaster closes; call [`EventBridge::stop`] to flush and end it.
pub struct EventBridge {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl EventBridge {
    /// Prints every event still queued, then ends the task.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!("Event bridge task failed: {}", e);
        }
    }
}

/// Starts rendering store events as progress lines. Category statistics are
/// refreshed whenever a classification finishes.
pub fn start_event_bridge(store: &UploadStateStore, api: ApiClient) -> EventBridge {
    let mut rx = store.subscribe();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        debug!("Starting event bridge");
        let mut renderer = Renderer::new(api);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => renderer.handle(event).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Upload event bridge lagged, missed {} events", n);
                    }
                    Err(RecvError::Closed) => {
                        info!("Upload event broadcaster closed, stopping event bridge");
                        return;
                    }
                },
                _ = &mut shutdown_rx => break,
            }
        }

        drain(&mut rx, &mut renderer).await;
        debug!("Event bridge stopped");
    });

    EventBridge {
        shutdown_tx,
        handle,
    }
}

async fn drain(rx: &mut broadcast::Receiver<UploadEvent>, renderer: &mut Renderer) {
    loop {
        match rx.try_recv() {
            Ok(event) => renderer.handle(event).await,
            Err(TryRecvError::Lagged(n)) => {
                warn!("Upload event bridge lagged, missed {} events", n);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

struct Renderer {
    api: ApiClient,
    printed: HashMap<String, (JobPhase, u8)>,
    last_stats: Option<Vec<(String, u64)>>,
}

impl Renderer {
    fn new(api: ApiClient) -> Self {
        Self {
            api,
            printed: HashMap::new(),
            last_stats: None,
        }
    }

    /// Progress is printed in steps of ten; phase changes always print.
    fn should_print(&mut self, job: &UploadJob) -> bool {
        let current = (job.phase, job.progress_percent);
        let print = match self.printed.get(&job.id) {
            None => true,
            Some(&(phase, progress)) => {
                phase != job.phase
                    || progress / 10 != job.progress_percent / 10
                    || job.advisory.is_some()
            }
        };
        if print {
            self.printed.insert(job.id.clone(), current);
        }
        print
    }

    async fn handle(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::JobAdded { job } | UploadEvent::JobUpdated { job } => {
                if self.should_print(&job) {
                    println!("{}", render_job(&job));
                }
            }
            UploadEvent::JobRemoved { job_id } => {
                self.printed.remove(&job_id);
                debug!("Job {} removed", job_id);
            }
            UploadEvent::CollectionsChanged { job_id } => {
                debug!("Classification of {} finished, refreshing categories", job_id);
                self.refresh_categories().await;
            }
            UploadEvent::BatchFinished { summary } => {
                info!(
                    "Batch uploaded: {} of {} files accepted, {} failed, {} skipped",
                    summary.uploaded, summary.admitted, summary.failed, summary.dropped
                );
            }
        }
    }

    async fn refresh_categories(&mut self) {
        match self.api.category_stats().await {
            Ok(stats) => {
                let counts = counts(&stats);
                if self.last_stats.as_ref() != Some(&counts) {
                    println!("  collections: {}", render_counts(&counts));
                    self.last_stats = Some(counts);
                }
            }
            Err(e) => warn!("Failed to refresh category statistics: {}", e),
        }
    }
}

fn counts(stats: &CategoryStats) -> Vec<(String, u64)> {
    stats
        .categories
        .iter()
        .map(|c| (c.name.clone(), c.content_count))
        .collect()
}

pub fn render_counts(counts: &[(String, u64)]) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(name, count)| format!("{} {}", name, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One progress line, e.g. `[ 65%] report.pdf  Classifying`.
pub fn render_job(job: &UploadJob) -> String {
    let mut line = format!(
        "[{:>3}%] {}  {}",
        job.progress_percent, job.file_name, job.phase
    );

    match job.phase {
        JobPhase::Completed if !job.categories.is_empty() => {
            let categories: Vec<String> = job
                .categories
                .iter()
                .map(|c| format!("{} ({:.0}%)", c.name, c.confidence * 100.0))
                .collect();
            line.push_str(&format!(": {}", categories.join(", ")));
        }
        JobPhase::Failed => {
            if let Some(error) = &job.error {
                line.push_str(&format!(" [{}]: {}", error.kind, error.message));
            }
        }
        _ => {}
    }

    if let Some(advisory) = &job.advisory {
        line.push_str(&format!(" ({})", advisory));
    }
    line
}
