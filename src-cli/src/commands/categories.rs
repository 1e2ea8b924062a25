//! `pkb categories`: document counts per category, or one category's documents.

use crate::state::AppState;

pub async fn stats(state: &AppState) -> pkb_client::Result<()> {
    let stats = state.api.category_stats().await?;
    if stats.categories.is_empty() {
        println!("No categories yet");
        return Ok(());
    }

    let width = stats
        .categories
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);
    for category in &stats.categories {
        println!(
            "{:<width$}  {:>5}",
            category.name,
            category.content_count,
            width = width
        );
    }
    println!("{} documents in {} categories", stats.total_documents(), stats.categories.len());
    Ok(())
}

pub async fn documents(
    state: &AppState,
    name: &str,
    query: Option<&str>,
    top_k: u32,
) -> pkb_client::Result<()> {
    let listing = state.api.category_documents(name, query, top_k).await?;
    let title = listing
        .category
        .as_ref()
        .map(|c| c.name.as_str())
        .unwrap_or(name);

    if listing.results.is_empty() {
        println!("No documents in {}", title);
        return Ok(());
    }

    println!("{} ({} documents)", title, listing.total);
    for hit in &listing.results {
        let label = hit.title.as_deref().unwrap_or(&hit.content_id);
        println!("  {:.2}  {}  [{}]", hit.score, label, hit.content_id);
    }
    Ok(())
}
