use scopestate::{MigrationRunner, SharedConnector};
use scopestate_backend::{Backend, SqliteBackend, Statement};
use scopestate_core::{ResourceState, ResourceStatus, ScopeChain};
use serde_json::json;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary (honours `RUST_LOG`).
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[allow(dead_code)]
pub fn chain(segments: &[&str]) -> ScopeChain {
    ScopeChain::new(segments.iter().copied()).unwrap()
}

/// Resource state with distinguishable payloads.
#[allow(dead_code)]
pub fn resource(id: &str, seq: i64) -> ResourceState {
    ResourceState {
        id: id.to_string(),
        status: ResourceStatus::Created,
        kind: "test::Bucket".to_string(),
        fqn: format!("app/dev/{id}"),
        seq,
        data: json!({"arn": format!("arn:test:{id}"), "seq": seq}),
        props: json!({"name": id, "tags": {"env": "dev"}}),
        old_props: None,
        output: json!({"url": format!("https://{id}.example.com")}),
    }
}

/// Private in-memory SQLite with the bundled migrations applied.
#[allow(dead_code)]
pub async fn migrated_backend() -> Arc<dyn Backend> {
    let backend = SqliteBackend::in_memory().await.unwrap();
    MigrationRunner::bundled().run(&backend).await.unwrap();
    Arc::new(backend)
}

/// Connector handing one migrated in-memory database to every store.
#[allow(dead_code)]
pub async fn shared_connector() -> Arc<SharedConnector> {
    let backend = SqliteBackend::in_memory().await.unwrap();
    Arc::new(SharedConnector::prepare(Arc::new(backend)).await.unwrap())
}

/// Names of the tables present in a SQLite database.
#[allow(dead_code)]
pub async fn table_names(backend: &dyn Backend) -> Vec<String> {
    backend
        .execute(&Statement::new(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        ))
        .await
        .unwrap()
        .iter()
        .map(|row| row.text(0).unwrap().to_string())
        .collect()
}

/// Rows in the migration bookkeeping table.
#[allow(dead_code)]
pub async fn recorded_migrations(backend: &dyn Backend) -> i64 {
    let rows = backend
        .execute(&Statement::new(format!(
            "SELECT COUNT(*) FROM \"{}\"",
            scopestate::migrations::MIGRATIONS_TABLE
        )))
        .await
        .unwrap();
    rows[0].integer(0).unwrap()
}
