//! Statement execution contract and storage engines for scopestate.
//!
//! This crate provides:
//! - The engine-neutral [`Backend`] trait with its value, statement and row types
//! - An embedded SQLite engine (file-backed or in-memory)
//! - A remote engine speaking a batched raw-query HTTP API
//! - The provisioning client used to find or create remote databases

pub mod api;
pub mod backends;
pub mod error;
pub mod traits;

pub use api::{CreateDatabaseOptions, CreatedDatabase, DatabaseInfo, RemoteApi};
pub use backends::{remote::RemoteBackend, sqlite::SqliteBackend};
pub use error::{BackendError, BackendResult, RemoteFault};
pub use traits::{Backend, BatchLimits, Row, SqlValue, Statement};
