//! `pkb status`: one status query, shown as the client-side phase.

use pkb_client::api::StatusResponse;
use pkb_client::upload::translate;

use super::wire_name;
use crate::state::AppState;

pub async fn status(state: &AppState, content_id: &str) -> pkb_client::Result<()> {
    let status = state.api.status(content_id).await?;
    println!("{}", describe(&status));
    Ok(())
}

fn describe(status: &StatusResponse) -> String {
    let title = status.title.as_deref().unwrap_or(&status.content_id);
    let mut lines = vec![format!(
        "{}: parsing {}, classification {}",
        title,
        wire_name(&status.parsing_status),
        wire_name(&status.classification_status)
    )];

    match translate(status) {
        Some(patch) => {
            if let Some(phase) = patch.phase {
                let progress = patch.progress_percent.unwrap_or_default();
                lines.push(format!("  phase: {} ({}%)", phase, progress));
            }
            if let Some(error) = patch.error {
                lines.push(format!("  error: {}", error.message));
            }
            for category in patch.categories.unwrap_or_default() {
                lines.push(format!(
                    "  category: {} ({:.0}%)",
                    category.name,
                    category.confidence * 100.0
                ));
            }
        }
        None => lines.push("  phase: waiting for the backend".to_string()),
    }

    if let Some(message) = &status.message {
        lines.push(format!("  {}", message));
    }
    lines.join("\n")
}
