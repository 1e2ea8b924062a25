//! Client-side admission control and window sizing for upload batches.

use std::collections::HashSet;
use std::time::Duration;

use crate::config::{AdmissionConfig, SchedulingConfig};
use crate::error::AdmissionError;
use crate::upload::job::UploadFile;

/// Files that passed admission, plus the count silently dropped for an
/// unaccepted extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub files: Vec<UploadFile>,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    max_files: usize,
    max_file_size_bytes: u64,
    max_batch_size_bytes: u64,
    accepted_extensions: HashSet<String>,
}

impl AdmissionPolicy {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            max_files: config.max_files,
            max_file_size_bytes: config.max_file_size_bytes,
            max_batch_size_bytes: config.max_batch_size_bytes,
            accepted_extensions: config
                .accepted_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn accepts(&self, file: &UploadFile) -> bool {
        file.extension()
            .map(|ext| self.accepted_extensions.contains(&ext))
            .unwrap_or(false)
    }

    /// Filters unaccepted extensions, then checks the count and size limits
    /// against what remains. Any violation rejects the whole batch.
    pub fn admit(&self, files: Vec<UploadFile>) -> Result<Admitted, AdmissionError> {
        let submitted = files.len();
        let files: Vec<UploadFile> = files
            .into_iter()
            .filter(|file| {
                let accepted = self.accepts(file);
                if !accepted {
                    log::debug!("Dropping {}: extension not accepted", file.name);
                }
                accepted
            })
            .collect();
        let dropped = submitted - files.len();

        if files.len() > self.max_files {
            return Err(AdmissionError::TooManyFiles {
                count: files.len(),
                max: self.max_files,
                files: names(&files),
            });
        }

        let oversized: Vec<String> = files
            .iter()
            .filter(|f| f.size_bytes > self.max_file_size_bytes)
            .map(|f| f.name.clone())
            .collect();
        if !oversized.is_empty() {
            return Err(AdmissionError::FileTooLarge {
                max_bytes: self.max_file_size_bytes,
                files: oversized,
            });
        }

        let total_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
        if total_bytes > self.max_batch_size_bytes {
            return Err(AdmissionError::BatchTooLarge {
                total_bytes,
                max_bytes: self.max_batch_size_bytes,
                files: names(&files),
            });
        }

        Ok(Admitted { files, dropped })
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(&AdmissionConfig::default())
    }
}

fn names(files: &[UploadFile]) -> Vec<String> {
    files.iter().map(|f| f.name.clone()).collect()
}

/// Window size and pacing for a batch.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    large_average_bytes: u64,
    medium_average_bytes: u64,
    large_concurrency: usize,
    medium_concurrency: usize,
    small_concurrency: usize,
    window_delay: Duration,
}

impl SchedulingPolicy {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            large_average_bytes: config.large_average_bytes,
            medium_average_bytes: config.medium_average_bytes,
            large_concurrency: config.large_concurrency.max(1),
            medium_concurrency: config.medium_concurrency.max(1),
            small_concurrency: config.small_concurrency.max(1),
            window_delay: Duration::from_millis(config.window_delay_ms),
        }
    }

    /// Window size from the average file size: bigger files, fewer at once.
    pub fn concurrency(&self, files: &[UploadFile]) -> usize {
        if files.is_empty() {
            return self.small_concurrency;
        }
        let total: u64 = files.iter().map(|f| f.size_bytes).sum();
        let average = total / files.len() as u64;

        if average >= self.large_average_bytes {
            self.large_concurrency
        } else if average >= self.medium_average_bytes {
            self.medium_concurrency
        } else {
            self.small_concurrency
        }
    }

    pub fn window_delay(&self) -> Duration {
        self.window_delay
    }
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::new(&SchedulingConfig::default())
    }
}
