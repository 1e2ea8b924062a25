//! In-process fake of the knowledge-base backend.
//!
//! Serves the ingest, search, collection and QA routes under `/api` on a random local
//! port. Status answers are scripted per content id; the last scripted
//! answer repeats. The server shuts down when the `FakeBackend` is dropped.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One scripted answer of the status route.
#[derive(Debug, Clone)]
pub enum ScriptedStatus {
    Json(Value),
    Error(u16),
}

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: usize,
}

#[derive(Default)]
pub struct BackendState {
    pub uploads: Mutex<Vec<ReceivedUpload>>,
    pub rejected_files: Mutex<HashSet<String>>,
    pub statuses: Mutex<HashMap<String, VecDeque<ScriptedStatus>>>,
    pub status_calls: AtomicUsize,
    pub qa_requests: Mutex<Vec<Value>>,
    pub feedback: Mutex<Vec<Value>>,
    pub search_queries: Mutex<Vec<HashMap<String, String>>>,
    pub collections: Mutex<Vec<Value>>,
}

pub struct FakeBackend {
    /// e.g. "http://127.0.0.1:12345"
    pub base_url: String,
    pub state: Arc<BackendState>,
    _shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FakeBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/api/ingest/upload", post(upload))
            .route("/api/ingest/status/{content_id}", get(status))
            .route("/api/search/", get(search))
            .route("/api/search/categories/stats", get(category_stats))
            .route("/api/search/category/{name}", get(category_documents))
            .route("/api/qa/ask", post(ask))
            .route("/api/qa/history", get(history))
            .route("/api/qa/feedback", post(feedback))
            .route("/api/collection/", get(list_collections).post(create_collection))
            .route(
                "/api/collection/{id}",
                put(update_collection).delete(delete_collection),
            )
            .route("/api/collection/{id}/contents", get(collection_contents))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().expect("Failed to read local address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Fake backend failed");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn script(&self, content_id: &str, answers: Vec<ScriptedStatus>) {
        self.state
            .statuses
            .lock()
            .unwrap()
            .insert(content_id.to_string(), answers.into());
    }

    pub fn reject_upload(&self, file_name: &str) {
        self.state
            .rejected_files
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub fn qa_requests(&self) -> Vec<Value> {
        self.state.qa_requests.lock().unwrap().clone()
    }

    pub fn feedback(&self) -> Vec<Value> {
        self.state.feedback.lock().unwrap().clone()
    }

    pub fn search_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.search_queries.lock().unwrap().clone()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state
            .collections
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c["name"].as_str().map(str::to_string))
            .collect()
    }
}

fn error(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

async fn upload(State(state): State<Arc<BackendState>>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().unwrap_or("").to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes.len(),
            Err(_) => return error(StatusCode::BAD_REQUEST, "Unreadable multipart body"),
        };

        state.uploads.lock().unwrap().push(ReceivedUpload {
            field_name: field_name.clone(),
            file_name: file_name.clone(),
            content_type,
            bytes,
        });

        if field_name != "file" {
            continue;
        }
        if state.rejected_files.lock().unwrap().contains(&file_name) {
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Storage backend unavailable");
        }

        return Json(json!({
            "status": "success",
            "content_id": format!("c-{}", file_name),
            "title": file_name,
            "processing_status": "processing",
            "chunks_created": 0,
            "file_size": bytes,
            "message": "File uploaded, processing in background"
        }))
        .into_response();
    }

    error(StatusCode::UNPROCESSABLE_ENTITY, "Missing file field")
}

async fn status(
    State(state): State<Arc<BackendState>>,
    Path(content_id): Path<String>,
) -> Response {
    state.status_calls.fetch_add(1, Ordering::SeqCst);
    let answer = {
        let mut statuses = state.statuses.lock().unwrap();
        match statuses.get_mut(&content_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match answer {
        Some(ScriptedStatus::Json(mut body)) => {
            body["content_id"] = json!(content_id);
            Json(body).into_response()
        }
        Some(ScriptedStatus::Error(code)) => error(
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "Status lookup failed",
        ),
        None => error(StatusCode::NOT_FOUND, "File not found"),
    }
}

async fn category_stats() -> Json<Value> {
    Json(json!({
        "categories": [
            {"id": "1", "name": "Work", "color": "#2563eb", "is_system": true, "content_count": 3},
            {"id": "2", "name": "Travel", "color": "#16a34a", "is_system": true, "content_count": 1}
        ]
    }))
}

async fn category_documents(
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if name != "Work" {
        return Json(json!({
            "error": format!("Category '{}' not found", name),
            "results": [],
            "total": 0,
            "category_identifier": name
        }));
    }

    let top_k: usize = params
        .get("top_k")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let results: Vec<Value> = (0..3)
        .take(top_k)
        .map(|i| {
            json!({
                "score": 0.9 - i as f64 * 0.1,
                "text": "Quarterly planning notes",
                "title": format!("plan-{}.md", i),
                "content_id": format!("doc-{}", i),
                "source_uri": format!("/files/plan-{}.md", i),
                "modality": "text",
                "category_name": "Work"
            })
        })
        .collect();

    Json(json!({
        "category": {"id": "1", "name": "Work", "description": null, "color": "#2563eb"},
        "query": params.get("q"),
        "total": results.len(),
        "results": results
    }))
}

async fn ask(State(state): State<Arc<BackendState>>, Json(request): Json<Value>) -> Json<Value> {
    state.qa_requests.lock().unwrap().push(request.clone());
    let id = state.qa_requests.lock().unwrap().len();

    Json(json!({
        "question": request["question"],
        "answer": "Your tax documents are in the Finance category.",
        "session_id": request["session_id"],
        "confidence": 0.82,
        "sources": [{
            "title": "Tax 2023",
            "text": "Income tax return",
            "source_uri": "/files/tax-2023.pdf",
            "score": 0.91,
            "content_id": "doc-tax",
            "category_name": "Finance",
            "modality": "text",
            "confidence_percentage": 91
        }],
        "formatted_sources": "1. Tax 2023",
        "qa_id": id.to_string(),
        "tokens_used": 512,
        "response_time": 1.2
    }))
}

async fn history(
    State(state): State<Arc<BackendState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session_id) = params.get("session_id") else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "session_id is required");
    };

    let history: Vec<Value> = state
        .qa_requests
        .lock()
        .unwrap()
        .iter()
        .enumerate()
        .filter(|(_, r)| r["session_id"] == json!(session_id))
        .map(|(i, r)| {
            json!({
                "id": (i + 1).to_string(),
                "question": r["question"],
                "answer": "Your tax documents are in the Finance category.",
                "session_id": session_id,
                "confidence": 0.82,
                "created_at": "2024-05-01T10:00:00"
            })
        })
        .rev()
        .collect();

    Json(json!({
        "session_id": session_id,
        "total": history.len(),
        "history": history
    }))
    .into_response()
}

async fn feedback(State(state): State<Arc<BackendState>>, Json(request): Json<Value>) -> Response {
    if request["feedback"] != json!("good") && request["feedback"] != json!("bad") {
        return error(StatusCode::BAD_REQUEST, "Feedback must be good or bad");
    }
    state.feedback.lock().unwrap().push(request);
    Json(json!({"status": "success", "message": "Feedback recorded"})).into_response()
}

async fn search(
    State(state): State<Arc<BackendState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.search_queries.lock().unwrap().push(params.clone());
    let query = params.get("q").cloned().unwrap_or_default();
    if query.trim().is_empty() {
        return Json(json!({"error": "Query parameter 'q' is required", "results": [], "total": 0}));
    }
    if query == "explode" {
        return Json(json!({
            "query": query,
            "results": [],
            "total": 0,
            "response_time": 0.01,
            "search_type": "hybrid",
            "embedding_enabled": false,
            "error": "Vector index unavailable"
        }));
    }

    let top_k: usize = params
        .get("top_k")
        .and_then(|v| v.parse().ok())
        .unwrap_or(8);
    let results: Vec<Value> = (0..5)
        .take(top_k)
        .map(|i| {
            json!({
                "score": 0.95 - i as f64 * 0.1,
                "text": format!("Passage {} about {}", i, query),
                "title": format!("doc-{}.pdf", i),
                "content_id": format!("doc-{}", i),
                "source_uri": format!("/files/doc-{}.pdf", i),
                "modality": "pdf",
                "category_name": params.get("category")
            })
        })
        .collect();

    Json(json!({
        "query": query,
        "total": results.len(),
        "results": results,
        "response_time": 0.05,
        "search_type": params.get("search_type").cloned().unwrap_or_else(|| "hybrid".to_string()),
        "embedding_enabled": true
    }))
}

async fn list_collections(State(state): State<Arc<BackendState>>) -> Json<Value> {
    Json(Value::Array(state.collections.lock().unwrap().clone()))
}

async fn create_collection(
    State(state): State<Arc<BackendState>>,
    Json(request): Json<Value>,
) -> Response {
    let Some(name) = request["name"].as_str() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    };
    let mut collections = state.collections.lock().unwrap();
    if collections.iter().any(|c| c["name"] == json!(name)) {
        return error(StatusCode::BAD_REQUEST, "Collection name already exists");
    }

    let collection = json!({
        "id": format!("col-{}", collections.len() + 1),
        "name": name,
        "description": request["description"],
        "content_count": 0,
        "created_at": "2024-05-01T10:00:00",
        "updated_at": "2024-05-01T10:00:00",
        "auto_match": request["auto_match"]
    });
    collections.push(collection.clone());
    Json(collection).into_response()
}

async fn update_collection(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    let mut collections = state.collections.lock().unwrap();
    let Some(collection) = collections.iter_mut().find(|c| c["id"] == json!(id)) else {
        return error(StatusCode::NOT_FOUND, "Collection not found");
    };
    for key in ["name", "description"] {
        if let Some(value) = request.get(key) {
            collection[key] = value.clone();
        }
    }
    collection["updated_at"] = json!("2024-05-02T10:00:00");
    Json(collection.clone()).into_response()
}

async fn delete_collection(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
) -> Response {
    let mut collections = state.collections.lock().unwrap();
    let before = collections.len();
    collections.retain(|c| c["id"] != json!(id));
    if collections.len() == before {
        return error(StatusCode::NOT_FOUND, "Collection not found");
    }
    Json(json!({"status": "success", "message": "Collection deleted"})).into_response()
}

async fn collection_contents(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
) -> Response {
    let collections = state.collections.lock().unwrap();
    let Some(collection) = collections.iter().find(|c| c["id"] == json!(id)) else {
        return error(StatusCode::NOT_FOUND, "Collection not found");
    };
    Json(json!({
        "collection": collection["name"],
        "contents": [{
            "id": "doc-tax",
            "title": "Tax 2023",
            "modality": "pdf",
            "source_uri": "/files/tax-2023.pdf",
            "created_at": "2024-05-01T10:00:00"
        }],
        "total": 1
    }))
    .into_response()
}
