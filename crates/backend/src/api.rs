//! Client for the remote database HTTP API.
//!
//! Covers the provisioning calls (list/create databases) and the raw query
//! endpoint used by [`RemoteBackend`](crate::backends::remote::RemoteBackend).

use crate::error::{BackendError, BackendResult, RemoteFault};
use reqwest::{RequestBuilder, Url};
use scopestate_core::config::RemoteConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response envelope shared by every API endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<RemoteFault>,
}

/// A database visible to the account.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DatabaseInfo {
    pub uuid: String,
    pub name: String,
}

/// Result of a create call. The identifier is optional on the wire and must
/// be checked by the caller.
#[derive(Clone, Debug, Deserialize)]
pub struct CreatedDatabase {
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Read replication mode requested at creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadReplicationMode {
    #[default]
    Disabled,
    Auto,
}

/// Options for [`RemoteApi::create_database`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct CreateDatabaseOptions {
    pub read_replication: ReadReplication,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReadReplication {
    pub mode: ReadReplicationMode,
}

#[derive(Serialize)]
struct CreateDatabaseRequest<'a> {
    name: &'a str,
    #[serde(flatten)]
    options: &'a CreateDatabaseOptions,
}

/// One statement on the wire.
#[derive(Clone, Debug, Serialize)]
pub struct RawQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Serialize)]
struct RawBatchRequest<'a> {
    batch: &'a [RawQuery],
}

/// Tabular result of one statement, rows as nested arrays.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawResults {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

/// Per-statement entry of a raw query response.
#[derive(Clone, Debug, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub results: RawResults,
}

/// HTTP client for one account of the remote database service.
#[derive(Clone)]
pub struct RemoteApi {
    http: reqwest::Client,
    base_url: Url,
    account_id: String,
    token: String,
}

impl std::fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApi")
            .field("base_url", &self.base_url.as_str())
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl RemoteApi {
    pub fn new(base_url: &str, account_id: &str, token: &str) -> BackendResult<Self> {
        // `Url::join` drops the last path segment unless the base ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| BackendError::Config(format!("invalid API base URL {base_url:?}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            account_id: account_id.to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_config(config: &RemoteConfig) -> BackendResult<Self> {
        Self::new(&config.api_base_url, &config.account_id, &config.api_token)
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn url(&self, path: &str) -> BackendResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Config(format!("failed to build API URL: {e}")))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> BackendResult<T> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(BackendError::Remote {
                    status: status.as_u16(),
                    errors: vec![RemoteFault {
                        code: i64::from(status.as_u16()),
                        message: body,
                    }],
                });
            }
            Err(e) => {
                return Err(BackendError::Decode(format!(
                    "unexpected API response: {e}"
                )));
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(BackendError::Remote {
                status: status.as_u16(),
                errors: envelope.errors,
            });
        }
        envelope
            .result
            .ok_or_else(|| BackendError::MissingResult("API response has no result".to_string()))
    }

    /// List databases whose name matches `name`.
    pub async fn list_databases_by_name(&self, name: &str) -> BackendResult<Vec<DatabaseInfo>> {
        let mut url = self.url(&format!("accounts/{}/d1/database", self.account_id))?;
        url.query_pairs_mut().append_pair("name", name);
        let databases: Vec<DatabaseInfo> = self.send(self.http.get(url)).await?;
        // The name filter is a prefix match on some deployments.
        Ok(databases.into_iter().filter(|db| db.name == name).collect())
    }

    /// Create a database.
    pub async fn create_database(
        &self,
        name: &str,
        options: &CreateDatabaseOptions,
    ) -> BackendResult<CreatedDatabase> {
        let url = self.url(&format!("accounts/{}/d1/database", self.account_id))?;
        let body = CreateDatabaseRequest { name, options };
        self.send(self.http.post(url).json(&body)).await
    }

    /// Run one statement against a database.
    pub async fn raw_query(&self, database_id: &str, query: &RawQuery) -> BackendResult<Vec<RawResult>> {
        let url = self.raw_url(database_id)?;
        self.send(self.http.post(url).json(query)).await
    }

    /// Run several statements in one request; one result per statement.
    pub async fn raw_batch(
        &self,
        database_id: &str,
        queries: &[RawQuery],
    ) -> BackendResult<Vec<RawResult>> {
        let url = self.raw_url(database_id)?;
        self.send(self.http.post(url).json(&RawBatchRequest { batch: queries }))
            .await
    }

    fn raw_url(&self, database_id: &str) -> BackendResult<Url> {
        self.url(&format!(
            "accounts/{}/d1/database/{}/raw",
            self.account_id, database_id
        ))
    }
}
