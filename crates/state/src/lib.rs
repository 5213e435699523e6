//! Scoped resource state store.
//!
//! This crate provides:
//! - The [`StateStore`] contract and its generic [`ScopedStore`]
//! - Scope lifecycle (ensure/delete, root backfill and cleanup)
//! - Bundled schema migrations and the [`MigrationRunner`]
//! - Connectors for embedded and remote backends
//! - Remote database provisioning and process-wide client memoization

pub mod connector;
pub mod error;
pub mod memoize;
pub mod migrations;
pub mod provision;
pub mod scopes;
pub mod store;

pub use connector::{Connect, RemoteConnector, SharedConnector, SqliteConnector};
pub use error::{StateError, StateResult};
pub use memoize::Memoizer;
pub use migrations::{Migration, MigrationReport, MigrationRunner};
pub use provision::ensure_database;
pub use scopes::{delete_scope, ensure_scope, list_scopes};
pub use store::{ScopedStore, StateStore};

use scopestate_core::BackendConfig;
use scopestate_core::config::DEFAULT_STATE_FILE;
use std::sync::Arc;

/// Create a connector from configuration.
///
/// Nothing is opened here; the returned connector connects when a store
/// first needs it.
pub fn from_config(config: &BackendConfig) -> StateResult<Arc<dyn Connect>> {
    config.validate().map_err(StateError::Config)?;
    let connector: Arc<dyn Connect> = match config.clone().resolve() {
        BackendConfig::Sqlite { path } => Arc::new(SqliteConnector::file(
            path.unwrap_or_else(|| DEFAULT_STATE_FILE.into()),
        )),
        BackendConfig::Memory => Arc::new(SqliteConnector::memory()),
        BackendConfig::Remote(remote) => Arc::new(RemoteConnector::new(remote)),
    };
    tracing::debug!(connector = connector.connector_name(), "Created state connector");
    Ok(connector)
}
