//! Scoped resource store.

use crate::connector::Connect;
use crate::error::{StateError, StateResult};
use crate::scopes::{delete_scope, ensure_scope};
use async_trait::async_trait;
use scopestate_backend::{Backend, BackendError, Row, Statement};
use scopestate_core::{
    JsonCodec, ResourceCodec, ResourceRecord, ResourceState, ResourceStatus, ScopeChain,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;

/// Maximum ids bound into one `IN (...)` lookup.
pub const GET_BATCH_CHUNK: usize = 90;

const RESOURCE_COLUMNS: &str = "id, status, kind, fqn, seq, data, props, oldProps, output";

/// State store contract used by the orchestrator, one instance per scope.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Connect and make sure this scope exists. Idempotent.
    async fn init(&self) -> StateResult<()>;

    /// Remove this scope (and an emptied root). No-op if never initialized.
    async fn deinit(&self) -> StateResult<()>;

    /// Ids of every resource in this scope, sorted.
    async fn list(&self) -> StateResult<Vec<String>>;

    async fn count(&self) -> StateResult<usize>;

    async fn get(&self, id: &str) -> StateResult<Option<ResourceState>>;

    /// Resources for the given ids; ids with no row are left out.
    async fn get_batch(&self, ids: &[&str]) -> StateResult<HashMap<String, ResourceState>>;

    async fn all(&self) -> StateResult<HashMap<String, ResourceState>>;

    /// Insert or fully overwrite the resource stored under `id`.
    async fn set(&self, id: &str, state: ResourceState) -> StateResult<()>;

    /// Remove the resource stored under `id`; absent ids are ignored.
    async fn delete(&self, id: &str) -> StateResult<()>;
}

/// [`StateStore`] bound to one scope chain over any backend.
///
/// The connection is established on first use and shared by every call on
/// this instance. Only [`init`](StateStore::init) creates the scope row, so a
/// write issued before it fails with [`StateError::ScopeMissing`].
pub struct ScopedStore<C = JsonCodec> {
    chain: ScopeChain,
    scope_key: String,
    connector: Arc<dyn Connect>,
    codec: C,
    backend: OnceCell<Arc<dyn Backend>>,
    scope_ready: OnceCell<()>,
    deinitialized: AtomicBool,
}

impl ScopedStore<JsonCodec> {
    /// Store for `chain` using the JSON codec.
    pub fn open(chain: ScopeChain, connector: Arc<dyn Connect>) -> Self {
        Self::with_codec(chain, connector, JsonCodec)
    }
}

impl<C: ResourceCodec> ScopedStore<C> {
    pub fn with_codec(chain: ScopeChain, connector: Arc<dyn Connect>, codec: C) -> Self {
        Self {
            scope_key: chain.to_json(),
            chain,
            connector,
            codec,
            backend: OnceCell::new(),
            scope_ready: OnceCell::new(),
            deinitialized: AtomicBool::new(false),
        }
    }

    pub fn chain(&self) -> &ScopeChain {
        &self.chain
    }

    pub fn is_deinitialized(&self) -> bool {
        self.deinitialized.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> StateResult<()> {
        if self.is_deinitialized() {
            return Err(StateError::Deinitialized(self.chain.to_string()));
        }
        Ok(())
    }

    /// The shared backend, connecting on first call.
    async fn backend(&self) -> StateResult<&Arc<dyn Backend>> {
        self.ensure_live()?;
        self.backend
            .get_or_try_init(|| async {
                let backend = self.connector.connect().await?;
                tracing::info!(
                    scope = %self.chain,
                    connector = self.connector.connector_name(),
                    backend = backend.backend_name(),
                    "Connected state store"
                );
                Ok::<_, StateError>(backend)
            })
            .await
    }

    fn select(&self, filter: &str) -> Statement {
        Statement::new(format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE scope = ?{filter}"
        ))
        .bind(self.scope_key.as_str())
    }

    fn decode_row(&self, row: &Row) -> StateResult<ResourceState> {
        let record = ResourceRecord {
            id: row.text(0)?.to_string(),
            status: row.text(1)?.parse::<ResourceStatus>().map_err(StateError::Codec)?,
            kind: row.text(2)?.to_string(),
            fqn: row.text(3)?.to_string(),
            seq: row.integer(4)?,
            data: row.text(5)?.to_string(),
            props: row.text(6)?.to_string(),
            old_props: row.opt_text(7)?.map(str::to_string),
            output: row.text(8)?.to_string(),
        };
        self.codec
            .decode(&self.chain, record)
            .map_err(StateError::Codec)
    }

    fn decode_map(&self, rows: &[Row]) -> StateResult<HashMap<String, ResourceState>> {
        rows.iter()
            .map(|row| -> StateResult<(String, ResourceState)> {
                let state = self.decode_row(row)?;
                Ok((state.id.clone(), state))
            })
            .collect()
    }

    fn write_error(&self, err: BackendError) -> StateError {
        if err.is_foreign_key_violation() {
            StateError::ScopeMissing(self.chain.to_string())
        } else {
            StateError::Backend(err)
        }
    }
}

#[async_trait]
impl<C: ResourceCodec> StateStore for ScopedStore<C> {
    async fn init(&self) -> StateResult<()> {
        let backend = self.backend().await?;
        self.scope_ready
            .get_or_try_init(|| ensure_scope(backend.as_ref(), &self.chain))
            .await?;
        Ok(())
    }

    async fn deinit(&self) -> StateResult<()> {
        if self.is_deinitialized() || !self.scope_ready.initialized() {
            return Ok(());
        }
        let Some(backend) = self.backend.get() else {
            return Ok(());
        };
        let root_removed = delete_scope(backend.as_ref(), &self.chain).await?;
        self.deinitialized.store(true, Ordering::Release);
        tracing::info!(scope = %self.chain, root_removed, "Deinitialized state store");
        Ok(())
    }

    async fn list(&self) -> StateResult<Vec<String>> {
        let backend = self.backend().await?;
        let rows = backend
            .execute(
                &Statement::new("SELECT id FROM resources WHERE scope = ? ORDER BY id")
                    .bind(self.scope_key.as_str()),
            )
            .await?;
        rows.iter()
            .map(|row| -> StateResult<String> { Ok(row.text(0)?.to_string()) })
            .collect()
    }

    async fn count(&self) -> StateResult<usize> {
        let backend = self.backend().await?;
        let rows = backend
            .execute(
                &Statement::new("SELECT COUNT(*) FROM resources WHERE scope = ?")
                    .bind(self.scope_key.as_str()),
            )
            .await?;
        let count = match rows.first() {
            Some(row) => row.integer(0)?,
            None => 0,
        };
        usize::try_from(count)
            .map_err(|_| StateError::Backend(BackendError::Decode(format!("invalid count {count}"))))
    }

    async fn get(&self, id: &str) -> StateResult<Option<ResourceState>> {
        let backend = self.backend().await?;
        let rows = backend.execute(&self.select(" AND id = ?").bind(id)).await?;
        rows.first().map(|row| self.decode_row(row)).transpose()
    }

    async fn get_batch(&self, ids: &[&str]) -> StateResult<HashMap<String, ResourceState>> {
        if ids.is_empty() {
            self.ensure_live()?;
            return Ok(HashMap::new());
        }
        let backend = self.backend().await?;
        let mut found = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(GET_BATCH_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let statement = chunk.iter().fold(
                self.select(&format!(" AND id IN ({placeholders})")),
                |statement, id| statement.bind(*id),
            );
            let rows = backend.execute(&statement).await?;
            found.extend(self.decode_map(&rows)?);
        }
        Ok(found)
    }

    async fn all(&self) -> StateResult<HashMap<String, ResourceState>> {
        let backend = self.backend().await?;
        let rows = backend.execute(&self.select("")).await?;
        self.decode_map(&rows)
    }

    async fn set(&self, id: &str, mut state: ResourceState) -> StateResult<()> {
        let backend = self.backend().await?;
        state.id = id.to_string();
        let record = self
            .codec
            .encode(&self.chain, &state)
            .map_err(StateError::Codec)?;

        let statement = Statement::new(format!(
            "INSERT INTO resources (scope, {RESOURCE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (scope, id) DO UPDATE SET \
             status = excluded.status, kind = excluded.kind, fqn = excluded.fqn, \
             seq = excluded.seq, data = excluded.data, props = excluded.props, \
             oldProps = excluded.oldProps, output = excluded.output"
        ))
        .bind(self.scope_key.as_str())
        .bind(id)
        .bind(record.status.as_str())
        .bind(record.kind)
        .bind(record.fqn)
        .bind(record.seq)
        .bind(record.data)
        .bind(record.props)
        .bind(record.old_props)
        .bind(record.output);

        backend
            .execute(&statement)
            .await
            .map_err(|err| self.write_error(err))?;
        tracing::debug!(scope = %self.chain, id, status = %record.status, "Stored resource");
        Ok(())
    }

    async fn delete(&self, id: &str) -> StateResult<()> {
        let backend = self.backend().await?;
        backend
            .execute(
                &Statement::new("DELETE FROM resources WHERE scope = ? AND id = ?")
                    .bind(self.scope_key.as_str())
                    .bind(id),
            )
            .await?;
        Ok(())
    }
}
