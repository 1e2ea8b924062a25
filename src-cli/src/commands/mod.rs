//! Subcommands of `pkb`.
//!
//! - `upload`: Upload files and follow their classification
//! - `status`: One-off status query of an uploaded document
//! - `qa`: Questions, history, feedback and the persisted QA session
//! - `categories`: Category statistics and listings
//! - `search`: Search across all documents
//! - `collections`: Manage user-defined collections

pub mod categories;
pub mod collections;
pub mod qa;
pub mod search;
pub mod status;
pub mod upload;

use serde::Serialize;

/// Wire name of a serializable enum value, e.g. `quick_processing`.
pub(crate) fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => "unknown".to_string(),
    }
}
