//! Scope chains and scope rows.
//!
//! A scope is identified by its chain: the root-first list of scope names
//! leading to it (`["app"]`, `["app", "prod"]`, ...). Chains are persisted as
//! JSON text so they can serve as primary and foreign keys on any engine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-empty, root-first sequence of scope names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ScopeChain(Vec<String>);

impl ScopeChain {
    /// Build a chain from its segments.
    ///
    /// Returns an error if the chain is empty or any segment is empty.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(Error::InvalidScope("scope chain must not be empty".to_string()));
        }
        if let Some(pos) = segments.iter().position(|s| s.is_empty()) {
            return Err(Error::InvalidScope(format!(
                "scope chain segment {pos} is empty"
            )));
        }
        Ok(Self(segments))
    }

    /// Chain for a single root scope.
    pub fn root(name: impl Into<String>) -> Result<Self> {
        Self::new([name.into()])
    }

    /// Segments of the chain, root first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments (always at least one).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Chains are never empty; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether this chain names a root scope.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Whether this chain names a stage directly below a root.
    pub fn is_stage(&self) -> bool {
        self.0.len() == 2
    }

    /// The chain with its last segment removed, or `None` for a root.
    pub fn parent(&self) -> Option<ScopeChain> {
        if self.is_root() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The root chain (first segment only).
    pub fn root_chain(&self) -> ScopeChain {
        Self(vec![self.0[0].clone()])
    }

    /// A child chain extending this one by `name`.
    pub fn child(&self, name: impl Into<String>) -> Result<ScopeChain> {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self::new(segments)
    }

    /// Encode the chain in its stored JSON-text form.
    pub fn to_json(&self) -> String {
        // A Vec<String> always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decode a chain from its stored JSON-text form.
    pub fn from_json(text: &str) -> Result<Self> {
        let segments: Vec<String> = serde_json::from_str(text)
            .map_err(|e| Error::InvalidScope(format!("invalid stored scope chain {text:?}: {e}")))?;
        Self::new(segments)
    }
}

impl<'de> Deserialize<'de> for ScopeChain {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let segments = Vec::<String>::deserialize(deserializer)?;
        Self::new(segments).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ScopeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A persisted scope row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeRow {
    pub chain: ScopeChain,
    pub parent: Option<ScopeChain>,
}

impl ScopeRow {
    /// Row for `chain` with its parent derived from the chain itself.
    pub fn for_chain(chain: &ScopeChain) -> Self {
        Self {
            chain: chain.clone(),
            parent: chain.parent(),
        }
    }
}
