//! `pkb collections`: list, create, rename, delete and browse collections.
//!
//! Collections are addressed by id or by name.

use pkb_client::Collection;

use crate::state::AppState;

fn render_collection(collection: &Collection, name_width: usize) -> String {
    let mut line = format!(
        "{:<width$}  {:>5}  {}",
        collection.name,
        collection.content_count,
        collection.id,
        width = name_width
    );
    if let Some(description) = collection.description.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!("  {}", description));
    }
    line
}

pub async fn list(state: &AppState) -> pkb_client::Result<()> {
    let collections = state.collections.list().await?;
    if collections.is_empty() {
        println!("No collections yet");
        return Ok(());
    }

    let width = collections
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);
    for collection in &collections {
        println!("{}", render_collection(collection, width));
    }
    Ok(())
}

pub async fn create(
    state: &AppState,
    name: &str,
    description: Option<&str>,
    auto_match: bool,
) -> pkb_client::Result<()> {
    let collection = state.collections.create(name, description, auto_match).await?;
    println!("Created collection {} [{}]", collection.name, collection.id);
    Ok(())
}

pub async fn update(
    state: &AppState,
    collection: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> pkb_client::Result<()> {
    let existing = state.collections.find(collection).await?;
    let updated = state.collections.update(&existing.id, name, description).await?;
    println!("Updated collection {} [{}]", updated.name, updated.id);
    Ok(())
}

pub async fn delete(state: &AppState, collection: &str) -> pkb_client::Result<()> {
    let existing = state.collections.find(collection).await?;
    state.collections.delete(&existing.id).await?;
    println!("Deleted collection {}", existing.name);
    Ok(())
}

pub async fn contents(state: &AppState, collection: &str) -> pkb_client::Result<()> {
    let existing = state.collections.find(collection).await?;
    let contents = state.collections.contents(&existing.id).await?;

    if contents.contents.is_empty() {
        println!("{} is empty", contents.collection);
        return Ok(());
    }

    println!("{} ({} documents)", contents.collection, contents.contents.len());
    for item in &contents.contents {
        let label = item.title.as_deref().unwrap_or(&item.id);
        let modality = item.modality.as_deref().unwrap_or("-");
        println!("  {}  {}  [{}]", label, modality, item.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_collection() {
        let mut collection: Collection = serde_json::from_str(
            r#"{"id": "col-1", "name": "Taxes", "content_count": 4}"#,
        )
        .unwrap();
        assert_eq!(render_collection(&collection, 8), "Taxes         4  col-1");

        collection.description = Some("Returns".to_string());
        assert_eq!(
            render_collection(&collection, 5),
            "Taxes      4  col-1  Returns"
        );
    }
}
