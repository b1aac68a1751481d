//! The driver collaborator.
//!
//! Connection handling, pooling, load balancing and the wire protocol all
//! live behind [`Session`]. This crate only prepares, submits and decodes.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::codec::TransportValue;
use crate::error::DriverResult;
use crate::statement::{PreparedHandle, Statement};
use crate::value::ValueType;

/// Future returned by [`Session::execute_async`].
pub type ResultFuture = BoxFuture<'static, DriverResult<ResultSet>>;

/// A driver session.
pub trait Session: Send + Sync {
    /// Prepares query text.
    fn prepare(&self, query: &str) -> DriverResult<PreparedHandle>;

    /// Executes a statement, blocking the calling thread until it completes.
    fn execute(&self, statement: &Statement) -> DriverResult<ResultSet>;

    /// Submits a statement and returns a handle on its eventual result.
    ///
    /// The returned future must not borrow the session.
    fn execute_async(&self, statement: Statement) -> ResultFuture;
}

impl<S: Session + ?Sized> Session for Arc<S> {
    fn prepare(&self, query: &str) -> DriverResult<PreparedHandle> {
        (**self).prepare(query)
    }

    fn execute(&self, statement: &Statement) -> DriverResult<ResultSet> {
        (**self).execute(statement)
    }

    fn execute_async(&self, statement: Statement) -> ResultFuture {
        (**self).execute_async(statement)
    }
}

/// Result column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    name: String,
    value_type: ValueType,
}

impl ColumnSpec {
    /// Creates column metadata.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column type.
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }
}

/// Rows as returned by the driver, in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<TransportValue>>,
}

impl ResultSet {
    /// Creates a result set.
    pub fn new(columns: Vec<ColumnSpec>, rows: Vec<Vec<TransportValue>>) -> Self {
        Self { columns, rows }
    }

    /// A result with no columns and no rows, as returned for writes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns column metadata.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Returns raw rows.
    pub fn rows(&self) -> &[Vec<TransportValue>] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
