//! Schema migrations and the runner that applies them exactly once.
//!
//! A migration unit is an ordered list of statements with a content hash and
//! an authoring timestamp. Applied units are recorded in
//! [`MIGRATIONS_TABLE`]; on each run every unit newer than the latest
//! recorded timestamp is applied, followed by its bookkeeping insert.

use crate::error::{StateError, StateResult};
use scopestate_backend::{Backend, BackendError, Statement};
use scopestate_core::sha256_hex;

/// Bookkeeping table holding one row per applied unit.
pub const MIGRATIONS_TABLE: &str = "__scopestate_migrations";

/// Separator between statements inside a migration file.
const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint";

/// Migrations shipped with this crate: (tag, authoring time in ms, SQL).
const BUNDLED: &[(&str, i64, &str)] = &[
    (
        "0000_init",
        1_735_689_600_000,
        include_str!("../migrations/0000_init.sql"),
    ),
    (
        "0001_scope_parent_index",
        1_738_368_000_000,
        include_str!("../migrations/0001_scope_parent_index.sql"),
    ),
];

/// One schema change unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    pub tag: String,
    pub statements: Vec<String>,
    pub hash: String,
    pub created_at: i64,
}

impl Migration {
    /// Build a unit from migration file text, split on statement breakpoints.
    pub fn from_sql(tag: impl Into<String>, created_at: i64, sql: &str) -> Self {
        let statements = sql
            .split(STATEMENT_BREAKPOINT)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            tag: tag.into(),
            statements,
            hash: sha256_hex(sql.as_bytes()),
            created_at,
        }
    }

    fn record_statement(&self) -> Statement {
        Statement::new(format!(
            "INSERT INTO \"{MIGRATIONS_TABLE}\" (\"hash\", \"created_at\") VALUES (?, ?)"
        ))
        .bind(self.hash.as_str())
        .bind(self.created_at)
    }

    /// Statements followed by the bookkeeping insert.
    fn operations(&self) -> Vec<Statement> {
        let mut ops: Vec<Statement> = self
            .statements
            .iter()
            .map(|sql| Statement::new(sql.as_str()))
            .collect();
        ops.push(self.record_statement());
        ops
    }
}

/// The migrations bundled with this crate, oldest first.
pub fn bundled() -> Vec<Migration> {
    BUNDLED
        .iter()
        .map(|(tag, created_at, sql)| Migration::from_sql(*tag, *created_at, sql))
        .collect()
}

/// Outcome of a migration run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tags of the units applied by this run, in order.
    pub applied: Vec<String>,
    /// Statements executed for those units, bookkeeping inserts included.
    pub statements: usize,
    /// Batches (or, on non-atomic backends, units) committed.
    pub batches: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies an ordered set of migrations to a backend.
#[derive(Clone, Debug)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::bundled()
    }
}

impl MigrationRunner {
    /// Runner over an arbitrary set of units; they are applied in ascending
    /// timestamp order regardless of the order given here.
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.created_at);
        Self { migrations }
    }

    /// Runner over the bundled migrations.
    pub fn bundled() -> Self {
        Self::new(bundled())
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Bring `backend` up to date.
    pub async fn run(&self, backend: &dyn Backend) -> StateResult<MigrationReport> {
        backend
            .execute(&Statement::new(format!(
                "CREATE TABLE IF NOT EXISTS \"{MIGRATIONS_TABLE}\" (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    hash text NOT NULL,
                    created_at numeric
                )"
            )))
            .await?;

        let last_applied = last_applied_at(backend).await?;
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| last_applied.is_none_or(|last| m.created_at > last))
            .collect();

        if pending.is_empty() {
            tracing::debug!(
                backend = backend.backend_name(),
                "Schema is up to date"
            );
            return Ok(MigrationReport::default());
        }

        let limits = backend.batch_limits();
        let report = if limits.atomic {
            apply_batched(backend, &pending, limits.max_statements).await?
        } else {
            apply_guarded(backend, &pending).await?
        };

        tracing::info!(
            backend = backend.backend_name(),
            applied = ?report.applied,
            statements = report.statements,
            batches = report.batches,
            "Applied schema migrations"
        );
        Ok(report)
    }
}

async fn last_applied_at(backend: &dyn Backend) -> StateResult<Option<i64>> {
    let rows = backend
        .execute(&Statement::new(format!(
            "SELECT created_at FROM \"{MIGRATIONS_TABLE}\" ORDER BY created_at DESC LIMIT 1"
        )))
        .await?;
    match rows.first() {
        Some(row) if !row.get(0)?.is_null() => Ok(Some(row.integer(0)?)),
        _ => Ok(None),
    }
}

/// Pack unit operations into batches of at most `max` statements.
///
/// Whole units are kept together when they fit. A unit larger than `max` is
/// split across consecutive batches; its bookkeeping insert is its last
/// operation and therefore lands in its final batch.
fn plan_batches(units: &[&Migration], max: usize) -> Vec<Vec<Statement>> {
    let max = max.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<Statement> = Vec::new();

    for unit in units {
        let ops = unit.operations();
        if current.len() + ops.len() <= max {
            current.extend(ops);
            continue;
        }
        if !current.is_empty() {
            batches.push(std::mem::take(&mut current));
        }
        if ops.len() <= max {
            current = ops;
            continue;
        }
        let mut chunks: Vec<Vec<Statement>> = ops.chunks(max).map(<[Statement]>::to_vec).collect();
        current = chunks.pop().unwrap_or_default();
        batches.extend(chunks);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn unit_tags(units: &[&Migration]) -> String {
    units
        .iter()
        .map(|u| u.tag.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn apply_batched(
    backend: &dyn Backend,
    units: &[&Migration],
    max_statements: usize,
) -> StateResult<MigrationReport> {
    let batches = plan_batches(units, max_statements);
    let mut report = MigrationReport::default();

    for batch in &batches {
        backend
            .batch(batch)
            .await
            .map_err(|source| migration_error(units, source))?;
        report.statements += batch.len();
        report.batches += 1;
    }
    report.applied = units.iter().map(|u| u.tag.clone()).collect();
    Ok(report)
}

/// Apply units one at a time on a backend without atomic batches.
///
/// A unit whose hash is already recorded is skipped, so a run interrupted
/// between a unit's statements and the next run's timestamp check cannot
/// apply the same unit twice.
async fn apply_guarded(backend: &dyn Backend, units: &[&Migration]) -> StateResult<MigrationReport> {
    let mut report = MigrationReport::default();

    for unit in units {
        let recorded = backend
            .execute(
                &Statement::new(format!(
                    "SELECT 1 FROM \"{MIGRATIONS_TABLE}\" WHERE hash = ? LIMIT 1"
                ))
                .bind(unit.hash.as_str()),
            )
            .await?;
        if !recorded.is_empty() {
            tracing::warn!(tag = %unit.tag, "Migration already recorded, skipping");
            continue;
        }

        for statement in unit.operations() {
            backend
                .execute(&statement)
                .await
                .map_err(|source| migration_error(&[unit], source))?;
            report.statements += 1;
        }
        report.batches += 1;
        report.applied.push(unit.tag.clone());
    }
    Ok(report)
}

fn migration_error(units: &[&Migration], source: BackendError) -> StateError {
    StateError::Migration {
        units: unit_tags(units),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(tag: &str, created_at: i64, statements: usize) -> Migration {
        let sql = (0..statements)
            .map(|i| format!("CREATE TABLE IF NOT EXISTS {tag}_{i} (id TEXT)"))
            .collect::<Vec<_>>()
            .join(&format!("\n{STATEMENT_BREAKPOINT}\n"));
        Migration::from_sql(tag, created_at, &sql)
    }

    fn is_record(statement: &Statement) -> bool {
        statement.sql.starts_with("INSERT INTO \"__scopestate_migrations\"")
    }

    #[test]
    fn test_from_sql_splits_on_breakpoints() {
        let m = unit("t", 1, 3);
        assert_eq!(m.statements.len(), 3);
        assert!(m.statements.iter().all(|s| !s.contains("-->")));
        assert_eq!(m.hash.len(), 64);
    }

    #[test]
    fn test_bundled_units_are_ordered_and_distinct() {
        let units = bundled();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].statements.len(), 2);
        assert!(units[0].created_at < units[1].created_at);
        assert_ne!(units[0].hash, units[1].hash);
    }

    #[test]
    fn test_runner_sorts_by_timestamp() {
        let runner = MigrationRunner::new(vec![unit("b", 20, 1), unit("a", 10, 1)]);
        let tags: Vec<&str> = runner.migrations().iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(tags, ["a", "b"]);
    }

    #[test]
    fn test_plan_keeps_units_whole_when_they_fit() {
        let a = unit("a", 1, 2);
        let b = unit("b", 2, 2);
        let batches = plan_batches(&[&a, &b], 4);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 3);
        assert!(is_record(&batches[0][2]));
        assert_eq!(batches[1].len(), 3);
    }

    #[test]
    fn test_plan_unbounded_is_single_batch() {
        let a = unit("a", 1, 2);
        let b = unit("b", 2, 1);
        let batches = plan_batches(&[&a, &b], usize::MAX);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[test]
    fn test_plan_splits_oversized_unit_with_record_last() {
        let big = unit("big", 1, 5);
        let batches = plan_batches(&[&big], 2);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), [2, 2, 2]);
        let last = batches.last().unwrap();
        assert!(is_record(last.last().unwrap()));
        assert!(
            batches[..batches.len() - 1]
                .iter()
                .flatten()
                .all(|s| !is_record(s))
        );
    }

    #[test]
    fn test_plan_never_exceeds_limit() {
        let units = [unit("a", 1, 1), unit("b", 2, 4), unit("c", 3, 2)];
        let refs: Vec<&Migration> = units.iter().collect();
        for max in 1..8 {
            let batches = plan_batches(&refs, max);
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= max));
            let total: usize = batches.iter().map(Vec::len).sum();
            assert_eq!(total, 1 + 1 + 4 + 1 + 2 + 1);
        }
    }
}
