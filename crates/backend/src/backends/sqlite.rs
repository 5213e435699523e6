//! Embedded SQLite backend.

use crate::error::BackendResult;
use crate::traits::{Backend, BatchLimits, Row, SqlValue, Statement};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Row as _, Sqlite, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite database running in-process, either file-backed or in memory.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (creating if missing) a database file.
    pub async fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors when several
            // processes share one state file.
            .busy_timeout(Duration::from_secs(5));

        tracing::info!(path = %path.display(), "Opening SQLite state database");
        Self::connect(opts).await
    }

    /// Open a private in-memory database.
    ///
    /// The database lives as long as this backend; it is not shared with any
    /// other backend instance.
    pub async fn in_memory() -> BackendResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> BackendResult<Self> {
        let pool = SqlitePoolOptions::new()
            // A single long-lived connection serializes writers (SQLite permits
            // one at a time anyway) and keeps in-memory databases alive.
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &'q [SqlValue]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Convert a SQLite row using each cell's runtime storage class.
fn decode_row(row: &SqliteRow) -> BackendResult<Row> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let storage_class = raw.type_info().name().to_string();
        let value = match storage_class.as_str() {
            "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" => SqlValue::Real(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
        };
        values.push(value);
    }
    Ok(Row(values))
}

#[async_trait]
impl Backend for SqliteBackend {
    #[instrument(skip(self, statement), fields(backend = "sqlite"))]
    async fn execute(&self, statement: &Statement) -> BackendResult<Vec<Row>> {
        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self, statements), fields(backend = "sqlite", statements = statements.len()))]
    async fn batch(&self, statements: &[Statement]) -> BackendResult<Vec<Vec<Row>>> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
                .fetch_all(&mut *tx)
                .await?;
            results.push(rows.iter().map(decode_row).collect::<BackendResult<Vec<_>>>()?);
        }
        // Dropping `tx` on any error above rolls the whole batch back.
        tx.commit().await?;
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits::unbounded()
    }
}
