//! Configuration types shared across crates.

use crate::error::{Error, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// State file used by the SQLite backend when no path is configured.
pub const DEFAULT_STATE_FILE: &str = ".scopestate/state.sqlite";

/// Remote database used when no name is configured.
pub const DEFAULT_DATABASE_NAME: &str = "scopestate";

/// Base URL of the remote provisioning and query API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4/";

/// Statements per remote batch request.
pub const DEFAULT_MAX_BATCH_STATEMENTS: usize = 50;

/// Environment variable prefix read by [`StateConfig::load`].
pub const ENV_PREFIX: &str = "SCOPESTATE_";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: BackendConfig,
}

impl StateConfig {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment (`SCOPESTATE_BACKEND__TYPE=remote`, ...), in that order.
    ///
    /// The returned configuration is validated and fully resolved.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(StateConfig::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: StateConfig = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.backend.validate().map_err(Error::Config)?;

        Ok(Self {
            backend: config.backend.resolve(),
        })
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Embedded SQLite database file.
    Sqlite {
        /// Database file path. Defaults to [`DEFAULT_STATE_FILE`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// Private in-memory SQLite database.
    Memory,
    /// Remote database reached over HTTP.
    Remote(RemoteConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Sqlite { path: None }
    }
}

impl BackendConfig {
    /// Replace implicit defaults with explicit values.
    pub fn resolve(self) -> Self {
        match self {
            Self::Sqlite { path: None } => Self::Sqlite {
                path: Some(PathBuf::from(DEFAULT_STATE_FILE)),
            },
            other => other,
        }
    }

    /// Path of the SQLite database file, if this is a file-backed config.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        match self {
            Self::Sqlite { path } => Some(
                path.clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            ),
            _ => None,
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Sqlite { path: Some(path) } if path.as_os_str().is_empty() => {
                Err("sqlite config 'path' must not be empty".to_string())
            }
            Self::Remote(remote) => remote.validate(),
            _ => Ok(()),
        }
    }
}

/// Remote database configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Account that owns the database.
    pub account_id: String,
    /// Bearer token for the provisioning and query API.
    /// WARNING: Prefer SCOPESTATE_BACKEND__API_TOKEN over storing it in a file.
    pub api_token: String,
    /// Name of the database; created on first use if missing.
    #[serde(default = "default_database_name")]
    pub database_name: String,
    /// API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Maximum statements per batch request.
    #[serde(default = "default_max_batch_statements")]
    pub max_batch_statements: usize,
}

fn default_database_name() -> String {
    DEFAULT_DATABASE_NAME.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_max_batch_statements() -> usize {
    DEFAULT_MAX_BATCH_STATEMENTS
}

impl RemoteConfig {
    /// Remote config with default database name, URL and batch size.
    pub fn new(account_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            api_token: api_token.into(),
            database_name: default_database_name(),
            api_base_url: default_api_base_url(),
            max_batch_statements: default_max_batch_statements(),
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.account_id.trim().is_empty() {
            return Err("remote config requires 'account_id'".to_string());
        }
        if self.api_token.trim().is_empty() {
            return Err("remote config requires 'api_token'".to_string());
        }
        if self.database_name.trim().is_empty() {
            return Err("remote config 'database_name' must not be empty".to_string());
        }
        if self.max_batch_statements == 0 {
            return Err("remote config 'max_batch_statements' must be at least 1".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("account_id", &self.account_id)
            .field("api_token", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("api_base_url", &self.api_base_url)
            .field("max_batch_statements", &self.max_batch_statements)
            .finish()
    }
}
