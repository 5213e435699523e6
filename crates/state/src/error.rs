//! State store error types.

use scopestate_backend::BackendError;
use thiserror::Error;

/// State store operation errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Core(#[from] scopestate_core::Error),

    #[error("codec error: {0}")]
    Codec(scopestate_core::Error),

    #[error("scope {0} does not exist")]
    ScopeMissing(String),

    #[error("scope {0} is still referenced by resources")]
    ScopeInUse(String),

    #[error("store for scope {0} has been deinitialized")]
    Deinitialized(String),

    #[error("provisioning error: {0}")]
    Provisioning(String),

    #[error("migration {units} failed: {source}")]
    Migration {
        units: String,
        #[source]
        source: BackendError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for state store operations.
pub type StateResult<T> = std::result::Result<T, StateError>;
