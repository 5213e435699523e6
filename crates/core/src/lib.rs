//! Core domain types shared by the scopestate crates.
//!
//! This crate defines the data model persisted by every backend:
//! - Scope chains and scope rows
//! - Resource status, decoded state and encoded records
//! - The codec boundary between the two
//! - Backend configuration and its fingerprint

pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod resource;
pub mod scope;

pub use codec::{JsonCodec, ResourceCodec};
pub use config::{BackendConfig, RemoteConfig, StateConfig};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, sha256_hex};
pub use resource::{ResourceRecord, ResourceState, ResourceStatus};
pub use scope::{ScopeChain, ScopeRow};
