//! `pkb upload`: submit files and follow them to the end of classification.

use std::path::PathBuf;

use log::{info, warn};
use pkb_client::{ApiError, PollOutcome, UploadFile};

use crate::events::{render_counts, start_event_bridge};
use crate::state::AppState;

fn collect_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>, ApiError> {
    paths
        .iter()
        .map(|path| {
            UploadFile::from_path(path).map_err(|e| ApiError::ReadFile {
                path: path.clone(),
                source: e,
            })
        })
        .collect()
}

pub async fn upload(state: &AppState, paths: Vec<PathBuf>) -> pkb_client::Result<()> {
    let files = collect_files(&paths)?;
    let bridge = start_event_bridge(&state.store, state.api.clone());

    let report = match state.coordinator.submit(files).await {
        Ok(report) => report,
        Err(e) => {
            bridge.stop().await;
            return Err(e.into());
        }
    };

    if report.summary.dropped > 0 {
        warn!(
            "{} file(s) skipped: unsupported file type",
            report.summary.dropped
        );
    }

    let outcomes = report.join_pollers().await;
    bridge.stop().await;

    let counts = state.store.counts();
    println!(
        "{} completed, {} failed, {} still processing",
        counts.completed,
        counts.failed,
        counts.in_progress()
    );

    for (job_id, outcome) in &outcomes {
        if *outcome != PollOutcome::TimedOut {
            continue;
        }
        if let Some(job) = state.store.get(job_id) {
            let content_id = job.backend_job_id.as_deref().unwrap_or("?");
            println!(
                "  {} is still being processed; check later with `pkb status {}`",
                job.file_name, content_id
            );
        }
    }

    if counts.completed > 0 {
        match state.api.category_stats().await {
            Ok(stats) => {
                let counts: Vec<(String, u64)> = stats
                    .categories
                    .iter()
                    .map(|c| (c.name.clone(), c.content_count))
                    .collect();
                println!("Collections: {}", render_counts(&counts));
            }
            Err(e) => warn!("Failed to load category statistics: {}", e),
        }
    }

    info!("Upload finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_reads_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, b"# Notes").unwrap();

        let files = collect_files(&[path]).unwrap();
        assert_eq!(files[0].name, "notes.md");
        assert_eq!(files[0].size_bytes, 7);
    }

    #[test]
    fn test_collect_files_missing_path() {
        let err = collect_files(&[PathBuf::from("/nonexistent/scan.pdf")]).unwrap_err();
        assert!(matches!(err, ApiError::ReadFile { .. }));
    }

    #[test]
    fn test_collect_files_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(&[dir.path().to_path_buf()]).is_err());
    }
}
