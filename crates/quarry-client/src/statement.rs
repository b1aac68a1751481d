//! Query descriptors and executable statements.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::TransportValue;
use crate::options::{Consistency, RetryPolicy, SerialConsistency};
use crate::query::StructuredQuery;
use crate::value::ValueType;

/// Driver-issued identifier of a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreparedId(Bytes);

impl PreparedId {
    /// Wraps raw id bytes.
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PreparedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A statement precompiled by the driver, with a fixed parameter list.
///
/// Cloning is cheap; the query text and parameter types are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    id: PreparedId,
    query: Arc<str>,
    param_types: Arc<[ValueType]>,
}

impl PreparedHandle {
    /// Creates a handle. Drivers call this from `Session::prepare`.
    pub fn new(id: PreparedId, query: impl Into<Arc<str>>, param_types: Vec<ValueType>) -> Self {
        Self {
            id,
            query: query.into(),
            param_types: param_types.into(),
        }
    }

    /// Returns the driver id.
    pub fn id(&self) -> &PreparedId {
        &self.id
    }

    /// Returns the text the handle was prepared from.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the declared parameter types, in order.
    pub fn param_types(&self) -> &[ValueType] {
        &self.param_types
    }

    /// Returns the declared parameter count.
    pub fn param_count(&self) -> usize {
        self.param_types.len()
    }
}

/// A prepared handle paired with its encoded parameter values.
///
/// Only [`crate::resolver::bind`] builds these, so the value count always
/// equals the handle's parameter count.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    handle: PreparedHandle,
    values: Vec<TransportValue>,
}

impl BoundStatement {
    pub(crate) fn new(handle: PreparedHandle, values: Vec<TransportValue>) -> Self {
        Self { handle, values }
    }

    /// Returns the prepared handle.
    pub fn handle(&self) -> &PreparedHandle {
        &self.handle
    }

    /// Returns the encoded values in bind order.
    pub fn values(&self) -> &[TransportValue] {
        &self.values
    }
}

/// Per-statement settings forwarded to the driver.
///
/// `None` leaves the driver default in place.
#[derive(Debug, Clone, Default)]
pub struct StatementSettings {
    /// Consistency level.
    pub consistency: Option<Consistency>,
    /// Serial consistency level for conditional updates.
    pub serial_consistency: Option<SerialConsistency>,
    /// Routing key for token-aware routing of simple statements.
    pub routing_key: Option<Bytes>,
    /// Retry policy handed to the driver.
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
    /// Server-side tracing.
    pub tracing: Option<bool>,
    /// Page size requested from the server.
    pub fetch_size: Option<u32>,
}

/// Statement body.
#[derive(Debug, Clone)]
pub enum StatementKind {
    /// Unprepared query text.
    Simple {
        /// The query text.
        query: String,
    },
    /// Prepared statement with bound values.
    Bound(BoundStatement),
}

/// An execution-ready statement.
#[derive(Debug, Clone)]
pub struct Statement {
    kind: StatementKind,
    settings: StatementSettings,
}

impl Statement {
    /// Creates a simple statement from query text.
    pub fn simple(query: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Simple {
                query: query.into(),
            },
            settings: StatementSettings::default(),
        }
    }

    /// Creates a statement from a bound prepared statement.
    pub fn bound(bound: BoundStatement) -> Self {
        Self {
            kind: StatementKind::Bound(bound),
            settings: StatementSettings::default(),
        }
    }

    /// Returns the statement body.
    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// Returns the query text (the prepared text for bound statements).
    pub fn query_text(&self) -> &str {
        match &self.kind {
            StatementKind::Simple { query } => query,
            StatementKind::Bound(bound) => bound.handle.query(),
        }
    }

    /// Returns true for bound prepared statements.
    pub fn is_prepared(&self) -> bool {
        matches!(self.kind, StatementKind::Bound(_))
    }

    /// Returns the bound statement, if any.
    pub fn as_bound(&self) -> Option<&BoundStatement> {
        match &self.kind {
            StatementKind::Bound(bound) => Some(bound),
            StatementKind::Simple { .. } => None,
        }
    }

    /// Returns the driver settings.
    pub fn settings(&self) -> &StatementSettings {
        &self.settings
    }

    /// Returns the driver settings for mutation.
    pub fn settings_mut(&mut self) -> &mut StatementSettings {
        &mut self.settings
    }
}

/// The accepted input shapes of a query.
#[derive(Debug, Clone)]
pub enum QueryDescriptor {
    /// Raw query text.
    Raw(String),
    /// A structured query compiled through the compilation cache.
    Structured(StructuredQuery),
    /// A prepared handle, bound with the call's values.
    Prepared(PreparedHandle),
    /// An already-built statement, passed through as is.
    Resolved(Statement),
}

impl QueryDescriptor {
    /// Returns the variant name, for logging.
    pub fn variant_name(&self) -> &'static str {
        match self {
            QueryDescriptor::Raw(_) => "raw",
            QueryDescriptor::Structured(_) => "structured",
            QueryDescriptor::Prepared(_) => "prepared",
            QueryDescriptor::Resolved(_) => "resolved",
        }
    }
}

impl From<&str> for QueryDescriptor {
    fn from(query: &str) -> Self {
        QueryDescriptor::Raw(query.to_string())
    }
}

impl From<String> for QueryDescriptor {
    fn from(query: String) -> Self {
        QueryDescriptor::Raw(query)
    }
}

impl From<StructuredQuery> for QueryDescriptor {
    fn from(query: StructuredQuery) -> Self {
        QueryDescriptor::Structured(query)
    }
}

impl From<PreparedHandle> for QueryDescriptor {
    fn from(handle: PreparedHandle) -> Self {
        QueryDescriptor::Prepared(handle)
    }
}

impl From<Statement> for QueryDescriptor {
    fn from(statement: Statement) -> Self {
        QueryDescriptor::Resolved(statement)
    }
}

impl From<&QueryDescriptor> for QueryDescriptor {
    fn from(query: &QueryDescriptor) -> Self {
        query.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepared_handle_accessors() {
        let handle = PreparedHandle::new(
            PreparedId::new(vec![0xab, 0x01]),
            "SELECT * FROM t WHERE id = ?",
            vec![ValueType::BigInt],
        );
        assert_eq!(handle.param_count(), 1);
        assert_eq!(handle.id().to_string(), "ab01");
        assert_eq!(handle.query(), "SELECT * FROM t WHERE id = ?");
    }

    #[test]
    fn test_simple_statement_defaults() {
        let stmt = Statement::simple("SELECT 1");
        assert_eq!(stmt.query_text(), "SELECT 1");
        assert!(!stmt.is_prepared());
        assert!(stmt.settings().consistency.is_none());
        assert!(stmt.settings().fetch_size.is_none());
    }

    #[test]
    fn test_descriptor_conversions() {
        assert_eq!(QueryDescriptor::from("SELECT 1").variant_name(), "raw");
        assert_eq!(
            QueryDescriptor::from(Statement::simple("SELECT 1")).variant_name(),
            "resolved"
        );
        assert_eq!(
            QueryDescriptor::from(StructuredQuery::select("t")).variant_name(),
            "structured"
        );
    }
}
