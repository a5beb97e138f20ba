//! Server-level errors: transport I/O and our own response encoding.
//!
//! Remote AnkiConnect failures never show up here; they stay inside tool
//! results. An error at this level means the stdio transport itself broke.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
