//! `pkb ask`, `pkb history`, `pkb feedback` and `pkb new-session`.
//!
//! The session id is kept in `<data_dir>/pkb/qa_session` so consecutive
//! invocations continue the same conversation.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use pkb_client::{Feedback, QaSession};

use crate::state::AppState;

const SESSION_FILE: &str = "qa_session";

fn session_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("pkb").join(SESSION_FILE))
}

fn load_session(path: Option<&Path>) -> QaSession {
    let Some(path) = path else {
        return QaSession::new();
    };
    match fs::read_to_string(path) {
        Ok(id) => QaSession::resume(id),
        Err(e) => {
            debug!("No stored QA session at {:?}: {}", path, e);
            QaSession::new()
        }
    }
}

fn save_session(path: Option<&Path>, session: &QaSession) -> std::io::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    match session.current() {
        Some(id) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, id)
        }
        None if path.exists() => fs::remove_file(path),
        None => Ok(()),
    }
}

pub async fn ask(
    state: &AppState,
    question: &str,
    category: Option<&str>,
) -> pkb_client::Result<()> {
    let path = session_path();
    let mut session = load_session(path.as_deref());

    let response = state.qa.ask(&mut session, question, category).await?;
    save_session(path.as_deref(), &session)?;

    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in response.sources.iter().enumerate() {
            let location = source.source_uri.as_deref().unwrap_or("");
            println!("  {}. {} {}", i + 1, source.title, location);
        }
    }
    println!();
    println!(
        "confidence {:.0}%, answer id {}",
        response.confidence * 100.0,
        response.qa_id
    );
    Ok(())
}

pub async fn history(state: &AppState) -> pkb_client::Result<()> {
    let session = load_session(session_path().as_deref());
    let history = state.qa.history(&session).await?;

    if history.history.is_empty() {
        println!("No questions asked in this session");
        return Ok(());
    }

    for item in history.chronological() {
        let when = item.created_at.as_deref().unwrap_or("");
        println!("[{}] {} {}", item.id, when, item.question);
        println!("    {}", item.answer);
    }
    Ok(())
}

pub async fn feedback(state: &AppState, qa_id: &str, rating: &str) -> pkb_client::Result<()> {
    let feedback: Feedback = rating.parse()?;
    state.qa.feedback(qa_id, feedback).await?;
    println!("Recorded {} feedback for answer {}", feedback, qa_id);
    Ok(())
}

pub fn new_session() -> pkb_client::Result<()> {
    save_session(session_path().as_deref(), &QaSession::new())?;
    println!("Started a new QA session");
    Ok(())
}
