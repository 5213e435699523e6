use async_trait::async_trait;
use scopestate::{Connect, StateResult};
use scopestate_backend::{
    Backend, BackendError, BackendResult, BatchLimits, Row, SqliteBackend, Statement,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SQLite backend that reports custom batch limits and records every call.
///
/// With `atomic: true` batches run in one transaction; with `atomic: false`
/// each statement commits on its own, like an engine without multi-statement
/// transactions.
#[allow(dead_code)]
pub struct InstrumentedBackend {
    inner: SqliteBackend,
    limits: BatchLimits,
    batch_sizes: Mutex<Vec<usize>>,
    executes: AtomicUsize,
}

#[allow(dead_code)]
impl InstrumentedBackend {
    pub async fn new(limits: BatchLimits) -> Self {
        Self {
            inner: SqliteBackend::in_memory().await.unwrap(),
            limits,
            batch_sizes: Mutex::new(Vec::new()),
            executes: AtomicUsize::new(0),
        }
    }

    pub async fn atomic(max_statements: usize) -> Self {
        Self::new(BatchLimits {
            max_statements,
            atomic: true,
        })
        .await
    }

    pub async fn non_atomic() -> Self {
        Self::new(BatchLimits {
            max_statements: usize::MAX,
            atomic: false,
        })
        .await
    }

    /// Sizes of every `batch` call, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn execute_count(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for InstrumentedBackend {
    async fn execute(&self, statement: &Statement) -> BackendResult<Vec<Row>> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(statement).await
    }

    async fn batch(&self, statements: &[Statement]) -> BackendResult<Vec<Vec<Row>>> {
        if statements.len() > self.limits.max_statements {
            return Err(BackendError::Config(format!(
                "batch of {} exceeds limit {}",
                statements.len(),
                self.limits.max_statements
            )));
        }
        self.batch_sizes.lock().unwrap().push(statements.len());
        if self.limits.atomic {
            return self.inner.batch(statements).await;
        }
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.inner.execute(statement).await?);
        }
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }

    fn batch_limits(&self) -> BatchLimits {
        self.limits
    }
}

/// Connector wrapper counting how many connections were established.
#[allow(dead_code)]
pub struct CountingConnector {
    inner: Arc<dyn Connect>,
    delay: Duration,
    connects: AtomicUsize,
}

#[allow(dead_code)]
impl CountingConnector {
    pub fn new(inner: Arc<dyn Connect>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connect for CountingConnector {
    async fn connect(&self) -> StateResult<Arc<dyn Backend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers could race.
        tokio::time::sleep(self.delay).await;
        self.inner.connect().await
    }

    fn connector_name(&self) -> &'static str {
        "counting"
    }
}
