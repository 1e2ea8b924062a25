use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub version: String,
    pub api_base_url: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub qa: QaConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            api_base_url: default_api_base_url(),
            http: HttpConfig::default(),
            admission: AdmissionConfig::default(),
            scheduling: SchedulingConfig::default(),
            polling: PollingConfig::default(),
            qa: QaConfig::default(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8003/api".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Uploads stream whole files and get a longer budget than JSON calls.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    300
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size_bytes: u64,
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
}

fn default_max_files() -> usize {
    5
}

fn default_max_file_size() -> u64 {
    20 * MIB
}

fn default_max_batch_size() -> u64 {
    100 * MIB
}

fn default_accepted_extensions() -> Vec<String> {
    [
        "txt", "md", "pdf", "jpg", "jpeg", "png", "gif", "bmp", "webp", "doc", "docx", "ppt",
        "pptx", "xls", "xlsx",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size_bytes: default_max_file_size(),
            max_batch_size_bytes: default_max_batch_size(),
            accepted_extensions: default_accepted_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Average file size at or above which the batch counts as large.
    #[serde(default = "default_large_average")]
    pub large_average_bytes: u64,
    #[serde(default = "default_medium_average")]
    pub medium_average_bytes: u64,
    #[serde(default = "default_large_concurrency")]
    pub large_concurrency: usize,
    #[serde(default = "default_medium_concurrency")]
    pub medium_concurrency: usize,
    #[serde(default = "default_small_concurrency")]
    pub small_concurrency: usize,
    #[serde(default = "default_window_delay")]
    pub window_delay_ms: u64,
}

fn default_large_average() -> u64 {
    10 * MIB
}

fn default_medium_average() -> u64 {
    MIB
}

fn default_large_concurrency() -> usize {
    2
}

fn default_medium_concurrency() -> usize {
    3
}

fn default_small_concurrency() -> usize {
    5
}

fn default_window_delay() -> u64 {
    500
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            large_average_bytes: default_large_average(),
            medium_average_bytes: default_medium_average(),
            large_concurrency: default_large_concurrency(),
            medium_concurrency: default_medium_concurrency(),
            small_concurrency: default_small_concurrency(),
            window_delay_ms: default_window_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTierConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_image_tier")]
    pub image: PollTierConfig,
    #[serde(default = "default_large_file_tier")]
    pub large_file: PollTierConfig,
    #[serde(default = "default_tier")]
    pub default: PollTierConfig,
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold_bytes: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_image_tier() -> PollTierConfig {
    PollTierConfig {
        interval_ms: 1000,
        max_attempts: 20,
    }
}

fn default_large_file_tier() -> PollTierConfig {
    PollTierConfig {
        interval_ms: 2000,
        max_attempts: 60,
    }
}

fn default_tier() -> PollTierConfig {
    PollTierConfig {
        interval_ms: 1500,
        max_attempts: 40,
    }
}

fn default_large_file_threshold() -> u64 {
    10 * MIB
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            image: default_image_tier(),
            large_file: default_large_file_tier(),
            default: default_tier(),
            large_file_threshold_bytes: default_large_file_threshold(),
            max_consecutive_failures: default_max_consecutive_failures(),
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Keyword,
    Semantic,
    #[default]
    Hybrid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Keyword => "keyword",
            SearchType::Semantic => "semantic",
            SearchType::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(SearchType::Keyword),
            "semantic" => Ok(SearchType::Semantic),
            "hybrid" => Ok(SearchType::Hybrid),
            other => Err(ApiError::InvalidRequest(format!(
                "Unknown search type '{}', expected keyword, semantic or hybrid",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default = "default_context_limit")]
    pub context_limit: u32,
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

fn default_model() -> String {
    "turing/gpt-4o-mini".to_string()
}

fn default_context_limit() -> u32 {
    3000
}

fn default_history_limit() -> u32 {
    100
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            search_type: SearchType::default(),
            context_limit: default_context_limit(),
            history_limit: default_history_limit(),
        }
    }
}
