//! Connectors establish a ready-to-use backend for a store.
//!
//! Local connectors open the engine and migrate it inline. The remote
//! connector provisions (and, on creation, migrates) the database once per
//! process and configuration, then hands every store the same client.

use crate::error::{StateError, StateResult};
use crate::memoize::Memoizer;
use crate::migrations::MigrationRunner;
use crate::provision::ensure_database;
use async_trait::async_trait;
use scopestate_backend::{Backend, RemoteApi, RemoteBackend, SqliteBackend};
use scopestate_core::{Fingerprint, RemoteConfig};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::sync::OnceCell;

/// Remote clients shared by every [`RemoteConnector`] built with
/// [`RemoteConnector::new`].
static REMOTE_CLIENTS: LazyLock<Arc<Memoizer<Arc<dyn Backend>>>> =
    LazyLock::new(|| Arc::new(Memoizer::new()));

/// Produces a migrated backend on demand.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    async fn connect(&self) -> StateResult<Arc<dyn Backend>>;

    /// Static identifier for logging.
    fn connector_name(&self) -> &'static str;
}

#[derive(Clone)]
enum SqliteTarget {
    File(PathBuf),
    Memory(Arc<OnceCell<Arc<dyn Backend>>>),
}

/// Embedded SQLite.
///
/// File targets open and migrate on every connect. The in-memory target opens
/// one database on first connect and hands it to every later caller.
#[derive(Clone)]
pub struct SqliteConnector {
    target: SqliteTarget,
}

impl SqliteConnector {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            target: SqliteTarget::File(path.as_ref().to_path_buf()),
        }
    }

    /// In-memory database shared by every store using this connector (and
    /// its clones).
    pub fn memory() -> Self {
        Self {
            target: SqliteTarget::Memory(Arc::new(OnceCell::new())),
        }
    }
}

#[async_trait]
impl Connect for SqliteConnector {
    async fn connect(&self) -> StateResult<Arc<dyn Backend>> {
        match &self.target {
            SqliteTarget::File(path) => {
                let backend = SqliteBackend::open(path).await?;
                MigrationRunner::bundled().run(&backend).await?;
                Ok(Arc::new(backend))
            }
            SqliteTarget::Memory(shared) => {
                let backend = shared
                    .get_or_try_init(|| async {
                        let backend = SqliteBackend::in_memory().await?;
                        MigrationRunner::bundled().run(&backend).await?;
                        Ok::<_, StateError>(Arc::new(backend) as Arc<dyn Backend>)
                    })
                    .await?;
                Ok(backend.clone())
            }
        }
    }

    fn connector_name(&self) -> &'static str {
        match self.target {
            SqliteTarget::File(_) => "sqlite",
            SqliteTarget::Memory(_) => "memory",
        }
    }
}

/// Hands out one already-open backend to every store.
#[derive(Clone)]
pub struct SharedConnector {
    backend: Arc<dyn Backend>,
}

impl SharedConnector {
    /// Share `backend` as is; the caller is responsible for its schema.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Migrate `backend` with the bundled migrations, then share it.
    pub async fn prepare(backend: Arc<dyn Backend>) -> StateResult<Self> {
        MigrationRunner::bundled().run(backend.as_ref()).await?;
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

#[async_trait]
impl Connect for SharedConnector {
    async fn connect(&self) -> StateResult<Arc<dyn Backend>> {
        Ok(self.backend.clone())
    }

    fn connector_name(&self) -> &'static str {
        "shared"
    }
}

/// Remote database client, provisioned at most once per configuration.
#[derive(Clone)]
pub struct RemoteConnector {
    config: RemoteConfig,
    clients: Arc<Memoizer<Arc<dyn Backend>>>,
}

impl RemoteConnector {
    /// Connector sharing clients process-wide.
    pub fn new(config: RemoteConfig) -> Self {
        Self::with_memoizer(config, REMOTE_CLIENTS.clone())
    }

    /// Connector sharing clients only through `clients`.
    pub fn with_memoizer(config: RemoteConfig, clients: Arc<Memoizer<Arc<dyn Backend>>>) -> Self {
        Self { config, clients }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }
}

#[async_trait]
impl Connect for RemoteConnector {
    async fn connect(&self) -> StateResult<Arc<dyn Backend>> {
        let key = Fingerprint::of(&self.config)?;
        let config = &self.config;
        self.clients
            .get_or_try_init(key, || async move {
                let api = RemoteApi::from_config(config)?;
                let database_id =
                    ensure_database(&api, &config.database_name, config.max_batch_statements)
                        .await?;
                let backend = RemoteBackend::new(api, database_id)
                    .with_max_batch_statements(config.max_batch_statements);
                Ok(Arc::new(backend) as Arc<dyn Backend>)
            })
            .await
    }

    fn connector_name(&self) -> &'static str {
        "remote"
    }
}
