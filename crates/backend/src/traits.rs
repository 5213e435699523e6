//! Statement execution contract.

use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;

/// A single SQL parameter or result cell.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Borrow the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is an integer or an integral real.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// A parameterized SQL statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// One result row, columns in select-list order.
///
/// Every engine produces this shape so callers never see engine-specific rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cell at `index`.
    pub fn get(&self, index: usize) -> BackendResult<&SqlValue> {
        self.0.get(index).ok_or_else(|| {
            BackendError::Decode(format!(
                "column {index} out of range (row has {} columns)",
                self.0.len()
            ))
        })
    }

    /// Non-null text cell at `index`.
    pub fn text(&self, index: usize) -> BackendResult<&str> {
        let value = self.get(index)?;
        value
            .as_text()
            .ok_or_else(|| BackendError::Decode(format!("column {index}: expected text, got {value:?}")))
    }

    /// Nullable text cell at `index`.
    pub fn opt_text(&self, index: usize) -> BackendResult<Option<&str>> {
        let value = self.get(index)?;
        if value.is_null() {
            return Ok(None);
        }
        self.text(index).map(Some)
    }

    /// Non-null integer cell at `index`.
    pub fn integer(&self, index: usize) -> BackendResult<i64> {
        let value = self.get(index)?;
        value.as_integer().ok_or_else(|| {
            BackendError::Decode(format!("column {index}: expected integer, got {value:?}"))
        })
    }
}

/// Batching constraints declared by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum statements accepted by one `batch` call.
    pub max_statements: usize,
    /// Whether a `batch` call commits all of its statements or none of them.
    pub atomic: bool,
}

impl BatchLimits {
    /// Limits of an engine that runs any number of statements in one transaction.
    pub const fn unbounded() -> Self {
        Self {
            max_statements: usize::MAX,
            atomic: true,
        }
    }
}

/// Minimal statement execution capability a storage engine must provide.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Execute one statement and return its rows (empty for writes).
    async fn execute(&self, statement: &Statement) -> BackendResult<Vec<Row>>;

    /// Execute statements in order, returning one row set per statement.
    ///
    /// When [`BatchLimits::atomic`] is true, either every statement takes
    /// effect or none does. Callers must not pass more than
    /// [`BatchLimits::max_statements`] statements.
    async fn batch(&self, statements: &[Statement]) -> BackendResult<Vec<Vec<Row>>>;

    /// Static identifier for logging (e.g., "sqlite", "remote").
    fn backend_name(&self) -> &'static str;

    /// Batching constraints of this engine.
    fn batch_limits(&self) -> BatchLimits;

    /// Verify the engine is reachable.
    async fn health_check(&self) -> BackendResult<()> {
        self.execute(&Statement::new("SELECT 1")).await?;
        Ok(())
    }
}
