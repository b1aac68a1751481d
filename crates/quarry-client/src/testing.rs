//! In-crate driver double for unit tests.

use std::collections::HashMap;

use futures_util::future;
use parking_lot::Mutex;

use crate::codec::encode;
use crate::error::{DriverError, DriverResult};
use crate::session::{ColumnSpec, ResultFuture, ResultSet, Session};
use crate::statement::{PreparedHandle, PreparedId, Statement};
use crate::value::{Value, ValueType};

/// Answers every query with a fixed result keyed by query text.
#[derive(Default)]
pub(crate) struct MockSession {
    results: HashMap<String, Vec<Vec<(String, Value)>>>,
    fail_prepare: bool,
    fail_execute: bool,
    executed: Mutex<Vec<Statement>>,
}

impl MockSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rows(mut self, query: &str, rows: Vec<Vec<(&str, Value)>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            .collect();
        self.results.insert(query.to_string(), rows);
        self
    }

    pub(crate) fn fail_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub(crate) fn fail_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub(crate) fn executed(&self) -> Vec<Statement> {
        self.executed.lock().clone()
    }

    fn run(&self, statement: &Statement) -> DriverResult<ResultSet> {
        self.executed.lock().push(statement.clone());
        if self.fail_execute {
            return Err(DriverError::Unavailable("0 of 1 replicas alive".to_string()));
        }

        let rows = match self.results.get(statement.query_text()) {
            Some(rows) => rows,
            None => return Ok(ResultSet::empty()),
        };
        let columns: Vec<ColumnSpec> = rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|(name, value)| {
                        ColumnSpec::new(name.as_str(), value.value_type().unwrap_or(ValueType::Blob))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let raw: Vec<Vec<_>> = rows
            .iter()
            .map(|row| row.iter().map(|(_, v)| encode(v).unwrap()).collect())
            .collect();
        Ok(ResultSet::new(columns, raw))
    }
}

impl Session for MockSession {
    fn prepare(&self, query: &str) -> DriverResult<PreparedHandle> {
        if self.fail_prepare {
            return Err(DriverError::Syntax(format!("no viable alternative at '{}'", query)));
        }
        let params = query.matches('?').count();
        Ok(PreparedHandle::new(
            PreparedId::new(query.as_bytes().to_vec()),
            query,
            vec![ValueType::BigInt; params],
        ))
    }

    fn execute(&self, statement: &Statement) -> DriverResult<ResultSet> {
        self.run(statement)
    }

    fn execute_async(&self, statement: Statement) -> ResultFuture {
        Box::pin(future::ready(self.run(&statement)))
    }
}
