//! Scope row lifecycle.

use crate::error::{StateError, StateResult};
use scopestate_backend::{Backend, BackendError, Statement};
use scopestate_core::{ScopeChain, ScopeRow};

const INSERT_SCOPE: &str =
    "INSERT INTO scopes (chain, parent) VALUES (?, ?) ON CONFLICT(chain) DO NOTHING";

/// Insert the row for `chain`, backfilling its root if the parent is one.
///
/// Both inserts are insert-if-absent, so calling this repeatedly, or from
/// several stores initializing the same tree in any order, is safe.
pub async fn ensure_scope(backend: &dyn Backend, chain: &ScopeChain) -> StateResult<()> {
    if let Some(parent) = chain.parent().filter(ScopeChain::is_root) {
        backend.execute(&insert_statement(&ScopeRow::for_chain(&parent))).await?;
    }
    backend.execute(&insert_statement(&ScopeRow::for_chain(chain))).await?;
    tracing::debug!(scope = %chain, "Ensured scope row");
    Ok(())
}

fn insert_statement(row: &ScopeRow) -> Statement {
    Statement::new(INSERT_SCOPE)
        .bind(row.chain.to_json())
        .bind(row.parent.as_ref().map(ScopeChain::to_json))
}

/// Delete the row for `chain`.
///
/// For a stage chain the root row is deleted too, in the same statement that
/// checks it has no other children and holds no resources. Deleting rows that
/// are already gone is not an error. Returns whether the root row was removed.
pub async fn delete_scope(backend: &dyn Backend, chain: &ScopeChain) -> StateResult<bool> {
    backend
        .execute(&Statement::new("DELETE FROM scopes WHERE chain = ?").bind(chain.to_json()))
        .await
        .map_err(|err| in_use(err, chain))?;

    if !chain.is_stage() {
        tracing::debug!(scope = %chain, "Deleted scope row");
        return Ok(false);
    }

    let root = chain.root_chain();
    let root_key = root.to_json();
    let removed = backend
        .execute(
            &Statement::new(
                "DELETE FROM scopes WHERE chain = ? \
                 AND NOT EXISTS (SELECT 1 FROM scopes WHERE parent = ?) \
                 AND NOT EXISTS (SELECT 1 FROM resources WHERE scope = ?) \
                 RETURNING chain",
            )
            .bind(root_key.as_str())
            .bind(root_key.as_str())
            .bind(root_key.as_str()),
        )
        .await
        .map_err(|err| in_use(err, &root))?;

    let root_removed = !removed.is_empty();
    tracing::debug!(scope = %chain, root_removed, "Deleted scope row");
    Ok(root_removed)
}

fn in_use(err: BackendError, chain: &ScopeChain) -> StateError {
    if err.is_foreign_key_violation() {
        StateError::ScopeInUse(chain.to_string())
    } else {
        StateError::Backend(err)
    }
}

/// Every scope row, ordered by chain.
pub async fn list_scopes(backend: &dyn Backend) -> StateResult<Vec<ScopeRow>> {
    let rows = backend
        .execute(&Statement::new("SELECT chain, parent FROM scopes"))
        .await?;
    // Stored keys are JSON text, whose byte order puts `["a","b"]` before `["a"]`.
    let mut scopes = rows
        .iter()
        .map(|row| -> StateResult<ScopeRow> {
            Ok(ScopeRow {
                chain: ScopeChain::from_json(row.text(0)?)?,
                parent: row.opt_text(1)?.map(ScopeChain::from_json).transpose()?,
            })
        })
        .collect::<StateResult<Vec<_>>>()?;
    scopes.sort_by(|a, b| a.chain.cmp(&b.chain));
    Ok(scopes)
}
