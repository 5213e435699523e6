//! One-time provisioning of remote databases.

use crate::error::{StateError, StateResult};
use crate::migrations::MigrationRunner;
use scopestate_backend::{CreateDatabaseOptions, RemoteApi, RemoteBackend};

/// Return the identifier of the database named `name`, creating it if needed.
///
/// A freshly created database is migrated before its identifier is returned;
/// an existing database is assumed to have been migrated when it was created.
pub async fn ensure_database(
    api: &RemoteApi,
    name: &str,
    max_batch_statements: usize,
) -> StateResult<String> {
    let existing = api.list_databases_by_name(name).await?;
    if let Some(database) = existing.into_iter().next() {
        tracing::debug!(
            account_id = api.account_id(),
            database = name,
            database_id = %database.uuid,
            "Using existing remote database"
        );
        return Ok(database.uuid);
    }

    let created = api
        .create_database(name, &CreateDatabaseOptions::default())
        .await?;
    let database_id = created
        .uuid
        .filter(|uuid| !uuid.is_empty())
        .ok_or_else(|| {
            StateError::Provisioning(format!(
                "creating database {name:?} returned no identifier"
            ))
        })?;
    tracing::info!(
        account_id = api.account_id(),
        database = name,
        database_id = %database_id,
        "Created remote database"
    );

    let backend = RemoteBackend::new(api.clone(), database_id.clone())
        .with_max_batch_statements(max_batch_statements);
    MigrationRunner::bundled().run(&backend).await?;

    Ok(database_id)
}
