//! Wire types of the ingest and search endpoints.

use serde::{Deserialize, Serialize};

use crate::config::SearchType;

/// Default number of hits of a general search.
pub const DEFAULT_SEARCH_TOP_K: u32 = 10;

/// Answer of `POST /ingest/upload`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadResponse {
    pub status: String,
    #[serde(default)]
    pub content_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub processing_status: Option<String>,
    #[serde(default)]
    pub chunks_created: Option<u64>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UploadResponse {
    /// The backend accepted the file and assigned it a content id.
    pub fn is_success(&self) -> bool {
        self.status == "success" && !self.content_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    #[default]
    Pending,
    Parsing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    #[default]
    Pending,
    QuickProcessing,
    QuickDone,
    AiProcessing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

/// A category assigned to a content item, as reported by the status endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryHit {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Answer of `GET /ingest/status/{content_id}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusResponse {
    pub content_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub processing_status: Option<String>,
    #[serde(default)]
    pub parsing_status: ParsingStatus,
    #[serde(default)]
    pub classification_status: ClassificationStatus,
    #[serde(default)]
    pub show_classification: bool,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub estimated_time: Option<f64>,
    #[serde(default)]
    pub categories: Vec<CategoryHit>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryCount {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub content_count: u64,
}

/// Answer of `GET /search/categories/stats`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CategoryStats {
    #[serde(default)]
    pub categories: Vec<CategoryCount>,
}

impl CategoryStats {
    pub fn total_documents(&self) -> u64 {
        self.categories.iter().map(|c| c.content_count).sum()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// One document hit of a search or category listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchHit {
    pub content_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Answer of `GET /search/category/{name}`. The backend reports lookup
/// failures in `error` with a success status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategorySearchResponse {
    #[serde(default)]
    pub category: Option<CategoryInfo>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Query of `GET /search/`. Empty filters are left out of the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: u32,
    pub search_type: SearchType,
    pub categories: Vec<String>,
    pub collections: Vec<String>,
    pub role: Option<String>,
    pub source: Option<String>,
    pub confidence_min: Option<f64>,
    pub confidence_max: Option<f64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_SEARCH_TOP_K,
            search_type: SearchType::default(),
            categories: Vec::new(),
            collections: Vec::new(),
            role: None,
            source: None,
            confidence_min: None,
            confidence_max: None,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("q", self.query.trim().to_string()),
            ("top_k", self.top_k.to_string()),
            ("search_type", self.search_type.as_str().to_string()),
        ];

        let categories = join_names(&self.categories);
        match categories.as_slice() {
            [] => {}
            [single] => pairs.push(("category", single.clone())),
            many => pairs.push(("categories", many.join(","))),
        }
        let collections = join_names(&self.collections);
        if !collections.is_empty() {
            pairs.push(("collections", collections.join(",")));
        }

        for (key, value) in [("role", &self.role), ("source", &self.source)] {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        }
        if let Some(min) = self.confidence_min {
            pairs.push(("confidence_min", min.to_string()));
        }
        if let Some(max) = self.confidence_max {
            pairs.push(("confidence_max", max.to_string()));
        }
        pairs
    }
}

fn join_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Answer of `GET /search/`. Search failures arrive in `error` with a
/// success status.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub search_type: Option<String>,
    #[serde(default)]
    pub embedding_enabled: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}
