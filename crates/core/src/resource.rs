//! Resource state and its stored record form.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a managed resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
}

impl ResourceStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [ResourceStatus; 6] = [
        Self::Creating,
        Self::Created,
        Self::Updating,
        Self::Updated,
        Self::Deleting,
        Self::Deleted,
    ];

    /// Stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidStatus(s.to_string()))
    }
}

/// Decoded state of a resource as seen by the orchestrator.
///
/// `data`, `props`, `old_props` and `output` are provider-owned structures;
/// this crate never looks inside them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub id: String,
    pub status: ResourceStatus,
    pub kind: String,
    pub fqn: String,
    pub seq: i64,
    pub data: Value,
    pub props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_props: Option<Value>,
    pub output: Value,
}

/// Encoded resource fields as written to a `resources` row (scope excluded).
///
/// Payload columns are opaque text blobs produced by a codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: String,
    pub status: ResourceStatus,
    pub kind: String,
    pub fqn: String,
    pub seq: i64,
    pub data: String,
    pub props: String,
    pub old_props: Option<String>,
    pub output: String,
}
