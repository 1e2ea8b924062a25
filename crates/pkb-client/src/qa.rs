//! Question answering over the knowledge base.

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::config::{QaConfig, SearchType};
use crate::error::ApiError;

/// Conversation context sent along with every question.
///
/// The id is created on first use and kept until [`QaSession::clear`], so a
/// caller can persist it with [`QaSession::current`] and pick the
/// conversation up later with [`QaSession::resume`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaSession {
    id: Option<String>,
}

impl QaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(id: impl Into<String>) -> Self {
        let id = id.into();
        let id = id.trim();
        Self {
            id: (!id.is_empty()).then(|| id.to_string()),
        }
    }

    /// Returns the session id, creating it if needed.
    pub fn id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_session_id)
    }

    pub fn current(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Forgets the session; the next question starts a new conversation.
    pub fn clear(&mut self) {
        self.id = None;
    }
}

/// `qa_<unix millis>_<9 hex chars>`
fn generate_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("qa_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

#[derive(Debug, Clone, Serialize)]
pub struct QaRequest {
    pub question: String,
    pub session_id: String,
    pub context_limit: u32,
    pub model: String,
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_filter: Option<String>,
}

/// A document passage the answer was grounded on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub confidence_percentage: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaResponse {
    pub question: String,
    pub answer: String,
    pub session_id: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<QaSource>,
    #[serde(default)]
    pub formatted_sources: Option<String>,
    pub qa_id: String,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Good,
    Bad,
}

impl FromStr for Feedback {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "good" | "up" | "+" => Ok(Feedback::Good),
            "bad" | "down" | "-" => Ok(Feedback::Bad),
            other => Err(ApiError::InvalidRequest(format!(
                "Unknown feedback '{}', expected good or bad",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Good => write!(f, "good"),
            Feedback::Bad => write!(f, "bad"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaHistoryItem {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaHistoryResponse {
    pub session_id: String,
    #[serde(default)]
    pub history: Vec<QaHistoryItem>,
    #[serde(default)]
    pub total: u64,
}

impl QaHistoryResponse {
    /// The backend lists newest first; this returns oldest first.
    pub fn chronological(&self) -> impl Iterator<Item = &QaHistoryItem> {
        self.history.iter().rev()
    }
}

#[derive(Debug, Clone, Serialize)]
struct FeedbackRequest<'a> {
    qa_id: &'a str,
    feedback: Feedback,
}

#[derive(Debug, Clone)]
pub struct QaClient {
    api: ApiClient,
    config: QaConfig,
}

impl QaClient {
    pub fn new(api: ApiClient, config: QaConfig) -> Self {
        Self { api, config }
    }

    pub fn build_request(
        &self,
        session: &mut QaSession,
        question: &str,
        category_filter: Option<&str>,
    ) -> Result<QaRequest, ApiError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Question must not be empty".to_string(),
            ));
        }

        Ok(QaRequest {
            question: question.to_string(),
            session_id: session.id().to_string(),
            context_limit: self.config.context_limit,
            model: self.config.model.clone(),
            search_type: self.config.search_type,
            category_filter: category_filter
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    pub async fn ask(
        &self,
        session: &mut QaSession,
        question: &str,
        category_filter: Option<&str>,
    ) -> Result<QaResponse, ApiError> {
        let request = self.build_request(session, question, category_filter)?;
        debug!(session_id = %request.session_id, "Asking question");

        let response: QaResponse = self.api.post_json(&["qa", "ask"], &request).await?;
        info!(
            qa_id = %response.qa_id,
            sources = response.sources.len(),
            "Answer received"
        );
        Ok(response)
    }

    /// History of the session, or an empty history if it never asked anything.
    pub async fn history(&self, session: &QaSession) -> Result<QaHistoryResponse, ApiError> {
        let Some(session_id) = session.current() else {
            return Ok(QaHistoryResponse {
                session_id: String::new(),
                history: Vec::new(),
                total: 0,
            });
        };

        self.api
            .get_json_with_query(
                &["qa", "history"],
                &[
                    ("session_id", session_id.to_string()),
                    ("limit", self.config.history_limit.to_string()),
                ],
            )
            .await
    }

    pub async fn feedback(&self, qa_id: &str, feedback: Feedback) -> Result<(), ApiError> {
        let qa_id = qa_id.trim();
        if qa_id.is_empty() {
            return Err(ApiError::InvalidRequest("qa_id must not be empty".to_string()));
        }

        let _: serde_json::Value = self
            .api
            .post_json(&["qa", "feedback"], &FeedbackRequest { qa_id, feedback })
            .await?;
        debug!(qa_id, %feedback, "Feedback submitted");
        Ok(())
    }
}
