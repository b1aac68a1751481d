//! # quarry-client
//!
//! Query execution layer on top of a wire-protocol database driver.
//!
//! This crate takes a query in any of its accepted shapes, turns it into one
//! executable statement, applies per-call options, runs it and decodes the
//! rows. It includes:
//!
//! - **Statement Resolution**: raw text, structured queries, prepared
//!   handles and ready statements all resolve to a [`Statement`]
//! - **Compilation Cache**: structured queries compile once per context
//! - **Execution Styles**: blocking, callback and channel, sharing one
//!   pipeline
//! - **Lazy Pagination**: pages fetched only as rows are consumed
//!
//! The driver itself sits behind the [`Session`] trait.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry_client::{execute, Consistency, ExecutionOptions, StructuredQuery};
//!
//! let options = ExecutionOptions::new().consistency(Consistency::Quorum);
//!
//! // Raw text
//! let rows = execute(&session, "SELECT * FROM users", &options)?;
//!
//! // Structured query, compiled through the cache
//! let query = StructuredQuery::select("users").where_eq("id", 1);
//! let rows = execute(&session, query, &options)?;
//!
//! // Prepared statement with bound values
//! let handle = prepare(&session, "SELECT * FROM users WHERE id = ?")?;
//! let rows = execute(&session, handle, &options.clone().values([1]))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Value codec.
pub mod codec;

/// Client configuration.
pub mod config;

/// Execution context.
pub mod context;

/// Error types.
pub mod error;

/// Execution coordinator.
pub mod executor;

/// Execution options.
pub mod options;

/// Lazy pagination.
pub mod paginate;

/// Structured queries.
pub mod query;

/// Statement resolution.
pub mod resolver;

/// Driver session.
pub mod session;

/// Query descriptors and statements.
pub mod statement;

/// Values and rows.
pub mod value;

#[cfg(test)]
mod testing;

// Re-exports
pub use codec::TransportValue;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use context::{ExecutionContext, ExecutionStats, ExecutionStatsSnapshot};
pub use error::{
    wrap, BindViolation, CodecError, DriverError, DriverResult, ErrorContext, ErrorKind,
    ExecutionError, QuarryResult,
};
pub use executor::{
    default_executor, execute, execute_async, execute_async_with, execute_chan,
    execute_chan_with, execute_with, Outcome, PendingExecution,
};
pub use options::{
    apply, Consistency, DefaultRetryPolicy, DowngradingConsistencyRetryPolicy, ExecutionOptions,
    FallthroughRetryPolicy, RetryPolicy, SerialConsistency,
};
pub use paginate::{paginate, paginate_with, Paginator};
pub use query::{CqlCompiler, QueryCompiler, StructuredQuery};
pub use resolver::{
    bind, prepare, prepare_structured, prepare_structured_with, resolve, resolve_with,
    CompileCache,
};
pub use session::{ColumnSpec, ResultFuture, ResultSet, Session};
pub use statement::{
    BoundStatement, PreparedHandle, PreparedId, QueryDescriptor, Statement, StatementKind,
    StatementSettings,
};
pub use value::{ColumnKey, FromValue, Row, Symbol, Value, ValueType};
