//! `pkb search`: search across all documents.

use pkb_client::api::{SearchHit, SearchRequest};
use pkb_client::config::SearchType;

use crate::state::AppState;

pub struct SearchArgs {
    pub query: String,
    pub top_k: u32,
    pub mode: Option<String>,
    pub categories: Vec<String>,
    pub collections: Vec<String>,
}

/// The configured QA search type applies unless `--mode` overrides it.
fn build_request(
    args: SearchArgs,
    default_type: SearchType,
) -> pkb_client::Result<SearchRequest> {
    let mut request = SearchRequest::new(args.query);
    request.top_k = args.top_k;
    request.search_type = match args.mode.as_deref() {
        Some(mode) => mode.parse()?,
        None => default_type,
    };
    request.categories = args.categories;
    request.collections = args.collections;
    Ok(request)
}

fn render_hit(rank: usize, hit: &SearchHit) -> String {
    let label = hit.title.as_deref().unwrap_or(&hit.content_id);
    let mut line = format!("{:>2}. {:.2}  {}", rank, hit.score, label);
    if let Some(category) = &hit.category_name {
        line.push_str(&format!("  <{}>", category));
    }
    line
}

pub async fn search(state: &AppState, args: SearchArgs) -> pkb_client::Result<()> {
    let request = build_request(args, state.search_type)?;
    let response = state.api.search(&request).await?;

    if response.results.is_empty() {
        println!("No documents match '{}'", request.query.trim());
        return Ok(());
    }

    for (i, hit) in response.results.iter().enumerate() {
        println!("{}", render_hit(i + 1, hit));
        if let Some(text) = hit.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let snippet: String = text.chars().take(120).collect();
            println!("      {}", snippet.replace('\n', " "));
        }
    }
    match response.response_time {
        Some(secs) => println!("{} hits in {:.2}s", response.total, secs),
        None => println!("{} hits", response.total),
    }
    Ok(())
}
