//! # quarry-test
//!
//! Test support for quarry.
//!
//! This crate contains:
//! - [`StubSession`], a deterministic in-memory driver
//! - [`init_tracing`], log output for test binaries
//! - End-to-end tests of the execution layer (under `tests/`)

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future;
use parking_lot::Mutex;
use quarry_client::codec::encode_as;
use quarry_client::{
    ColumnSpec, DriverError, DriverResult, PreparedHandle, PreparedId, ResultFuture, ResultSet,
    Session, Statement, Value, ValueType,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Statement verbs the stub accepts when preparing.
const KNOWN_VERBS: [&str; 4] = ["SELECT", "INSERT", "UPDATE", "DELETE"];

/// Installs a test-friendly tracing subscriber.
///
/// Honours `RUST_LOG`; defaults to debug output for the quarry crates.
/// Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("quarry_client=debug,quarry_test=debug"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}

type FailureFn = Arc<dyn Fn() -> DriverError + Send + Sync>;

#[derive(Clone)]
enum Response {
    Rows(ResultSet),
    Fail(FailureFn),
}

/// A scripted driver session.
///
/// Results are keyed by exact query text (the prepared text for bound
/// statements). Queries with no script succeed with an empty result, the
/// way writes are acknowledged. Preparing text that does not start with a
/// statement verb fails with a syntax error.
pub struct StubSession {
    responses: DashMap<String, Response>,
    fail_all: Option<FailureFn>,
    param_types: DashMap<String, Vec<ValueType>>,
    latency: Option<Duration>,
    executed: Mutex<Vec<Statement>>,
    prepares: AtomicUsize,
}

impl StubSession {
    /// Creates a stub with no scripted results.
    pub fn new() -> Self {
        Self {
            responses: DashMap::new(),
            fail_all: None,
            param_types: DashMap::new(),
            latency: None,
            executed: Mutex::new(Vec::new()),
            prepares: AtomicUsize::new(0),
        }
    }

    /// Scripts the rows returned for `query`.
    ///
    /// # Panics
    ///
    /// Panics if a value does not fit its column type.
    pub fn with_rows(
        self,
        query: &str,
        columns: &[(&str, ValueType)],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let columns: Vec<ColumnSpec> = columns
            .iter()
            .map(|(name, value_type)| ColumnSpec::new(*name, value_type.clone()))
            .collect();
        let rows: Vec<Vec<_>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&columns)
                    .map(|(value, column)| {
                        encode_as(value, column.value_type()).expect("stub rows must encode")
                    })
                    .collect()
            })
            .collect();
        self.responses
            .insert(query.to_string(), Response::Rows(ResultSet::new(columns, rows)));
        self
    }

    /// Scripts a failure for `query`.
    pub fn with_failure<F>(self, query: &str, failure: F) -> Self
    where
        F: Fn() -> DriverError + Send + Sync + 'static,
    {
        self.responses
            .insert(query.to_string(), Response::Fail(Arc::new(failure)));
        self
    }

    /// Makes every execution fail, whatever the query.
    pub fn failing<F>(mut self, failure: F) -> Self
    where
        F: Fn() -> DriverError + Send + Sync + 'static,
    {
        self.fail_all = Some(Arc::new(failure));
        self
    }

    /// Declares the parameter types `query` prepares with. Undeclared
    /// queries get one bigint parameter per `?`.
    pub fn with_params(self, query: &str, types: Vec<ValueType>) -> Self {
        self.param_types.insert(query.to_string(), types);
        self
    }

    /// Delays every execution.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns every statement executed so far, in submission order.
    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().clone()
    }

    /// Returns the number of statements executed so far.
    pub fn execution_count(&self) -> usize {
        self.executed.lock().len()
    }

    /// Returns the number of prepare calls.
    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    fn respond(&self, statement: &Statement) -> DriverResult<ResultSet> {
        self.executed.lock().push(statement.clone());
        debug!(query = statement.query_text(), "stub execute");

        if let Some(failure) = &self.fail_all {
            return Err(failure());
        }
        let response = self
            .responses
            .get(statement.query_text())
            .map(|entry| entry.value().clone());
        match response {
            Some(Response::Rows(result)) => Ok(result),
            Some(Response::Fail(failure)) => Err(failure()),
            None => Ok(ResultSet::empty()),
        }
    }
}

impl Default for StubSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for StubSession {
    fn prepare(&self, query: &str) -> DriverResult<PreparedHandle> {
        let id = self.prepares.fetch_add(1, Ordering::SeqCst);

        let verb = query.split_whitespace().next().unwrap_or("");
        if !KNOWN_VERBS.iter().any(|known| known.eq_ignore_ascii_case(verb)) {
            return Err(DriverError::Syntax(format!(
                "line 1:0 no viable alternative at input '{}'",
                verb
            )));
        }

        let types = match self.param_types.get(query) {
            Some(types) => types.value().clone(),
            None => vec![ValueType::BigInt; query.matches('?').count()],
        };
        Ok(PreparedHandle::new(
            PreparedId::new((id as u64).to_be_bytes().to_vec()),
            query,
            types,
        ))
    }

    fn execute(&self, statement: &Statement) -> DriverResult<ResultSet> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.respond(statement)
    }

    fn execute_async(&self, statement: Statement) -> ResultFuture {
        let result = self.respond(&statement);
        match self.latency {
            Some(latency) => Box::pin(async move {
                tokio::time::sleep(latency).await;
                result
            }),
            None => Box::pin(future::ready(result)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscripted_query_is_acknowledged() {
        let stub = StubSession::new();
        let result = stub.execute(&Statement::simple("INSERT INTO t (id) VALUES (1)")).unwrap();
        assert!(result.is_empty());
        assert_eq!(stub.execution_count(), 1);
    }

    #[test]
    fn test_prepare_counts_params() {
        let stub = StubSession::new().with_params(
            "SELECT * FROM t WHERE a = ? AND b = ?",
            vec![ValueType::Text, ValueType::Boolean],
        );

        let declared = stub.prepare("SELECT * FROM t WHERE a = ? AND b = ?").unwrap();
        assert_eq!(declared.param_types(), &[ValueType::Text, ValueType::Boolean]);

        let counted = stub.prepare("INSERT INTO t (a, b, c) VALUES (?, ?, ?)").unwrap();
        assert_eq!(counted.param_count(), 3);
        assert_ne!(declared.id(), counted.id());
    }

    #[test]
    fn test_prepare_rejects_garbage() {
        let stub = StubSession::new();
        assert!(matches!(stub.prepare("SELEC * FROM t"), Err(DriverError::Syntax(_))));
    }

    #[test]
    fn test_scripted_failure() {
        let stub = StubSession::new()
            .with_failure("SELECT * FROM t", || DriverError::Timeout("read".to_string()));
        assert!(matches!(
            stub.execute(&Statement::simple("SELECT * FROM t")),
            Err(DriverError::Timeout(_))
        ));
    }
}
