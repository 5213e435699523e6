//! Remote SQLite-compatible database reached through a batched HTTP API.

use crate::api::{RawQuery, RawResult, RemoteApi};
use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, BatchLimits, Row, SqlValue, Statement};
use async_trait::async_trait;
use scopestate_core::config::DEFAULT_MAX_BATCH_STATEMENTS;
use serde_json::Value;
use tracing::instrument;

/// Backend that sends each statement (or batch) as one HTTP round trip.
#[derive(Debug)]
pub struct RemoteBackend {
    api: RemoteApi,
    database_id: String,
    max_batch_statements: usize,
}

impl RemoteBackend {
    /// Bind to an existing database.
    pub fn new(api: RemoteApi, database_id: impl Into<String>) -> Self {
        Self {
            api,
            database_id: database_id.into(),
            max_batch_statements: DEFAULT_MAX_BATCH_STATEMENTS,
        }
    }

    /// Override the maximum statements per batch request (minimum 1).
    pub fn with_max_batch_statements(mut self, max: usize) -> Self {
        self.max_batch_statements = max.max(1);
        self
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }
}

fn to_wire(statement: &Statement) -> RawQuery {
    RawQuery {
        sql: statement.sql.clone(),
        params: statement.params.iter().map(param_to_json).collect(),
    }
}

fn param_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::from(*v),
        SqlValue::Real(v) => Value::from(*v),
        SqlValue::Text(v) => Value::String(v.clone()),
        SqlValue::Blob(v) => Value::Array(v.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Translate one nested-array cell into the engine-neutral value.
fn cell_from_json(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(b)),
        Value::Number(n) => match n.as_i64() {
            Some(v) => SqlValue::Integer(v),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            match bytes {
                Some(bytes) => SqlValue::Blob(bytes),
                None => SqlValue::Text(Value::Array(items).to_string()),
            }
        }
        other @ Value::Object(_) => SqlValue::Text(other.to_string()),
    }
}

fn rows_from_result(result: RawResult) -> Vec<Row> {
    result
        .results
        .rows
        .into_iter()
        .map(|cells| Row(cells.into_iter().map(cell_from_json).collect()))
        .collect()
}

#[async_trait]
impl Backend for RemoteBackend {
    #[instrument(skip(self, statement), fields(backend = "remote", database_id = %self.database_id))]
    async fn execute(&self, statement: &Statement) -> BackendResult<Vec<Row>> {
        let results = self
            .api
            .raw_query(&self.database_id, &to_wire(statement))
            .await?;
        let result = results.into_iter().next().ok_or_else(|| {
            BackendError::MissingResult("raw query response has no statement result".to_string())
        })?;
        Ok(rows_from_result(result))
    }

    #[instrument(skip(self, statements), fields(backend = "remote", statements = statements.len()))]
    async fn batch(&self, statements: &[Statement]) -> BackendResult<Vec<Vec<Row>>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        if statements.len() > self.max_batch_statements {
            return Err(BackendError::Config(format!(
                "batch of {} statements exceeds the limit of {}",
                statements.len(),
                self.max_batch_statements
            )));
        }

        let queries: Vec<RawQuery> = statements.iter().map(to_wire).collect();
        let results = self.api.raw_batch(&self.database_id, &queries).await?;
        if results.len() != statements.len() {
            return Err(BackendError::MissingResult(format!(
                "batch returned {} results for {} statements",
                results.len(),
                statements.len()
            )));
        }
        Ok(results.into_iter().map(rows_from_result).collect())
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_statements: self.max_batch_statements,
            atomic: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cells_translate_to_local_shape() {
        let result: RawResult = serde_json::from_value(json!({
            "results": {
                "columns": ["id", "seq", "ratio", "oldProps", "flag"],
                "rows": [["bucket", 3, 0.5, null, true]]
            }
        }))
        .unwrap();

        assert_eq!(
            rows_from_result(result),
            vec![Row(vec![
                SqlValue::Text("bucket".to_string()),
                SqlValue::Integer(3),
                SqlValue::Real(0.5),
                SqlValue::Null,
                SqlValue::Integer(1),
            ])]
        );
    }

    #[test]
    fn test_byte_arrays_become_blobs() {
        assert_eq!(
            cell_from_json(json!([1, 2, 255])),
            SqlValue::Blob(vec![1, 2, 255])
        );
        assert_eq!(
            cell_from_json(json!(["a"])),
            SqlValue::Text("[\"a\"]".to_string())
        );
    }

    #[test]
    fn test_params_to_wire() {
        let stmt = Statement::new("INSERT INTO t VALUES (?, ?, ?)")
            .bind("x")
            .bind(7_i64)
            .bind(None::<String>);
        let wire = to_wire(&stmt);
        assert_eq!(wire.params, vec![json!("x"), json!(7), Value::Null]);
    }

    #[test]
    fn test_max_batch_statements_floor() {
        let api = RemoteApi::new("https://api.example.com/", "acc", "tok").unwrap();
        let backend = RemoteBackend::new(api, "db").with_max_batch_statements(0);
        assert_eq!(backend.batch_limits().max_statements, 1);
    }
}
