//! Error types for the execution layer.
//!
//! Every failure that leaves this crate is an [`ExecutionError`] built by
//! [`wrap`]. The narrower enums here describe the underlying causes: codec
//! failures, bind violations and driver failures.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::statement::{PreparedHandle, Statement};
use crate::value::{Value, ValueType};

/// Default message for failures while preparing query text.
pub const PREPARE_FAILED: &str = "query prepare failed";

/// Default message for failures while binding parameters.
pub const BIND_FAILED: &str = "query bind failed";

/// Default message for failures while executing a statement.
pub const EXECUTE_FAILED: &str = "query execution failed";

/// Result type for execution-layer operations.
pub type QuarryResult<T> = Result<T, ExecutionError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// The stage at which an [`ExecutionError`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Query text failed to prepare against the driver.
    Prepare,
    /// Parameter encoding, arity or type mismatch during bind.
    Bind,
    /// A resolved statement failed during submission, execution or decoding.
    Execute,
}

impl ErrorKind {
    /// Returns a stable name for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Prepare => "prepare_error",
            ErrorKind::Bind => "bind_error",
            ErrorKind::Execute => "execute_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures encoding or decoding transport values.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// List elements do not share a type.
    #[error("list elements must share one type: expected {expected}, found {found}")]
    HeterogeneousList {
        /// Type of the first element.
        expected: ValueType,
        /// Type of the offending element.
        found: ValueType,
    },

    /// Value does not fit the declared type.
    #[error("value does not fit declared type {0}")]
    TypeMismatch(ValueType),

    /// Collections cannot carry null elements.
    #[error("null element in collection")]
    NullInCollection,

    /// Payload exceeds the 32-bit length prefix.
    #[error("value too large for transport: {0} bytes")]
    ValueTooLarge(usize),

    /// Payload length does not match the fixed width of its type.
    #[error("invalid {value_type} payload: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Declared type.
        value_type: ValueType,
        /// Required width.
        expected: usize,
        /// Width found.
        actual: usize,
    },

    /// Text payload is not UTF-8.
    #[error("invalid utf-8 in text value")]
    InvalidUtf8,

    /// Collection payload ended early or carried a bad length prefix.
    #[error("malformed collection payload: {0}")]
    Malformed(String),

    /// Result row width does not match the column metadata.
    #[error("row has {actual} values but result metadata declares {expected} columns")]
    ColumnCountMismatch {
        /// Declared column count.
        expected: usize,
        /// Values in the row.
        actual: usize,
    },
}

/// Reasons a bind is rejected before a statement exists.
#[derive(Debug, Clone, Error)]
pub enum BindViolation {
    /// Wrong number of values for the prepared statement.
    #[error("expected {expected} parameters, got {actual}")]
    Arity {
        /// Declared parameter count.
        expected: usize,
        /// Values supplied.
        actual: usize,
    },

    /// A value does not fit the declared parameter type.
    #[error("parameter {index} expects {expected}, got {actual}")]
    TypeMismatch {
        /// Zero-based parameter position.
        index: usize,
        /// Declared type.
        expected: ValueType,
        /// Supplied value.
        actual: Value,
    },

    /// A value failed to encode.
    #[error("parameter {index} could not be encoded: {source}")]
    Encode {
        /// Zero-based parameter position.
        index: usize,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
}

/// Failures reported by the driver collaborator.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Query text is not valid.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Query is valid but refers to something that does not exist or is
    /// otherwise rejected.
    #[error("invalid query: {0}")]
    Invalid(String),

    /// Not enough replicas to satisfy the requested consistency.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The coordinator timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Server-side error with a protocol code.
    #[error("server error {code}: {message}")]
    Server {
        /// Protocol error code.
        code: i32,
        /// Server message.
        message: String,
    },

    /// Anything else the driver raises.
    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync>),
}

/// Context captured at the point of failure.
///
/// Carries whichever of the query text, statement, prepared handle and
/// attempted values exist when the failure happens. A message set here
/// overrides the default message passed to [`wrap`].
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    query: Option<String>,
    statement: Option<Statement>,
    prepared: Option<PreparedHandle>,
    values: Option<Vec<Value>>,
    message: Option<String>,
}

impl ErrorContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a failure while handling `statement`.
    pub fn for_statement(statement: &Statement) -> Self {
        Self::new()
            .query(statement.query_text())
            .statement(statement.clone())
    }

    /// Sets the raw query text.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the statement.
    pub fn statement(mut self, statement: Statement) -> Self {
        self.statement = Some(statement);
        self
    }

    /// Sets the prepared handle.
    pub fn prepared(mut self, handle: PreparedHandle) -> Self {
        self.prepared = Some(handle);
        self
    }

    /// Sets the attempted values. Empty slices are not recorded.
    pub fn values(mut self, values: &[Value]) -> Self {
        if !values.is_empty() {
            self.values = Some(values.to_vec());
        }
        self
    }

    /// Overrides the default message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The uniform failure value of the execution layer.
///
/// The underlying cause is always kept and is reachable through
/// [`std::error::Error::source`] or [`ExecutionError::cause`].
#[derive(Debug, Clone)]
pub struct ExecutionError {
    kind: ErrorKind,
    message: String,
    query: Option<String>,
    statement: Option<Statement>,
    prepared: Option<PreparedHandle>,
    values: Option<Vec<Value>>,
    cause: Arc<dyn StdError + Send + Sync + 'static>,
}

impl ExecutionError {
    /// Returns the failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the raw query text, if known.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the statement that failed, if one existed.
    pub fn statement(&self) -> Option<&Statement> {
        self.statement.as_ref()
    }

    /// Returns the prepared handle a bind failed against.
    pub fn prepared(&self) -> Option<&PreparedHandle> {
        self.prepared.as_ref()
    }

    /// Returns the values that were being bound or executed.
    pub fn values(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }

    /// Returns the underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }

    /// Downcasts the underlying cause.
    pub fn cause_as<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)?;
        if let Some(query) = &self.query {
            write!(f, ": {}", query)?;
        }
        Ok(())
    }
}

impl StdError for ExecutionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause as &(dyn StdError + 'static))
    }
}

/// Wraps `cause` into an [`ExecutionError`] of the given kind.
pub fn wrap<E>(
    cause: E,
    context: ErrorContext,
    kind: ErrorKind,
    default_message: &str,
) -> ExecutionError
where
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    let cause: Box<dyn StdError + Send + Sync> = cause.into();
    ExecutionError {
        kind,
        message: context
            .message
            .unwrap_or_else(|| default_message.to_string()),
        query: context.query,
        statement: context.statement,
        prepared: context.prepared,
        values: context.values,
        cause: Arc::from(cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_keeps_cause_and_context() {
        let err = wrap(
            DriverError::Syntax("line 1:7 no viable alternative".to_string()),
            ErrorContext::new()
                .query("SELEC * FROM t")
                .values(&[Value::Integer(1)]),
            ErrorKind::Prepare,
            PREPARE_FAILED,
        );

        assert_eq!(err.kind(), ErrorKind::Prepare);
        assert_eq!(err.message(), PREPARE_FAILED);
        assert_eq!(err.query(), Some("SELEC * FROM t"));
        assert_eq!(err.values(), Some(&[Value::Integer(1)][..]));
        assert!(err.statement().is_none());
        assert!(matches!(
            err.cause_as::<DriverError>(),
            Some(DriverError::Syntax(_))
        ));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_context_message_overrides_default() {
        let err = wrap(
            CodecError::InvalidUtf8,
            ErrorContext::new().message("row 3 is corrupt"),
            ErrorKind::Execute,
            EXECUTE_FAILED,
        );
        assert_eq!(err.message(), "row 3 is corrupt");
        assert_eq!(err.to_string(), "row 3 is corrupt (execute_error)");
    }

    #[test]
    fn test_empty_values_not_recorded() {
        let err = wrap(
            DriverError::Timeout("read".to_string()),
            ErrorContext::new().values(&[]),
            ErrorKind::Execute,
            EXECUTE_FAILED,
        );
        assert!(err.values().is_none());
    }

    #[test]
    fn test_string_causes_are_accepted() {
        let err = wrap("boom", ErrorContext::new(), ErrorKind::Execute, EXECUTE_FAILED);
        assert_eq!(err.cause().to_string(), "boom");
    }
}
