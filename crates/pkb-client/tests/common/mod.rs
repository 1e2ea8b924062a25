//! Shared test utilities for pkb-client integration tests.
//!
//! This module provides:
//! - `FakeBackend`, an in-process HTTP backend with scripted status answers
//! - helpers for client configuration and files on disk

pub mod backend;
pub mod fixtures;

pub use backend::{FakeBackend, ScriptedStatus};
pub use fixtures::*;
