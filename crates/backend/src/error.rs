//! Backend error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message emitted by SQLite (and SQLite-compatible remote engines) when a
/// foreign key check fails.
const FOREIGN_KEY_MESSAGE: &str = "FOREIGN KEY constraint failed";

/// A single error reported by the remote API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

fn format_faults(faults: &[RemoteFault]) -> String {
    if faults.is_empty() {
        return "no error details reported".to_string();
    }
    faults
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Backend operation errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote error (HTTP {status}):\n{}", format_faults(.errors))]
    Remote { status: u16, errors: Vec<RemoteFault> },

    #[error("missing result: {0}")]
    MissingResult(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Whether this error is a referential-integrity failure.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.kind() == sqlx::error::ErrorKind::ForeignKeyViolation
                    || db.message().contains(FOREIGN_KEY_MESSAGE)
            }
            Self::Remote { errors, .. } => errors
                .iter()
                .any(|fault| fault.message.contains(FOREIGN_KEY_MESSAGE)),
            _ => false,
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
