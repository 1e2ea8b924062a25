//! Configuration and file fixtures.

#![allow(dead_code)]

use std::path::Path;

use serde_json::{json, Value};

use pkb_client::config::{ClientConfig, PollTierConfig};
use pkb_client::upload::UploadFile;

/// Client config pointing at `base_url` with fast polling so that tests
/// finish in real time.
pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig {
        api_base_url: format!("{}/api", base_url),
        ..Default::default()
    };
    let fast = PollTierConfig {
        interval_ms: 10,
        max_attempts: 50,
    };
    config.polling.image = fast;
    config.polling.large_file = fast;
    config.polling.default = fast;
    config.scheduling.window_delay_ms = 10;
    config
}

/// Writes `content` to `dir/name` and returns it as an upload file.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> UploadFile {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    UploadFile::from_path(&path).expect("Failed to stat test file")
}

pub fn status_json(parsing: &str, classification: &str, show: bool) -> Value {
    json!({
        "content_id": "scripted",
        "title": "scripted",
        "processing_status": "processing",
        "parsing_status": parsing,
        "classification_status": classification,
        "show_classification": show,
        "file_type": "document",
        "file_size": 0,
        "estimated_time": 5,
        "categories": [],
        "created_at": "2024-05-01T10:00:00"
    })
}

pub fn completed_json(categories: &[(&str, f64)]) -> Value {
    let mut status = status_json("completed", "completed", true);
    status["processing_status"] = json!("completed");
    status["categories"] = categories
        .iter()
        .enumerate()
        .map(|(i, (name, confidence))| {
            json!({
                "id": (i + 1).to_string(),
                "name": name,
                "confidence": confidence,
                "reasoning": null,
                "role": if i == 0 { "primary_system" } else { "secondary_system" },
                "source": "ai"
            })
        })
        .collect();
    status
}
