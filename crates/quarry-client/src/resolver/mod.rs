//! Statement resolution.
//!
//! Turns any [`QueryDescriptor`] into one executable [`Statement`]:
//!
//! - raw text becomes a simple statement
//! - structured queries are compiled (through the [`CompileCache`]) and then
//!   treated as raw text
//! - prepared handles are bound with the call's values
//! - resolved statements pass through untouched

use std::sync::Arc;

use quarry_cache::{CacheStatsSnapshot, SyncLruCache};
use tracing::trace;

use crate::codec;
use crate::context::ExecutionContext;
use crate::error::{
    wrap, BindViolation, ErrorContext, ErrorKind, QuarryResult, BIND_FAILED, PREPARE_FAILED,
};
use crate::query::{QueryCompiler, StructuredQuery};
use crate::session::Session;
use crate::statement::{BoundStatement, PreparedHandle, QueryDescriptor, Statement};
use crate::value::Value;

/// Bounded LRU cache from structured queries to compiled text.
///
/// Keys compare structurally. Concurrent misses on the same key may both
/// compile; the last insert wins and the size bound holds either way.
pub struct CompileCache {
    entries: SyncLruCache<StructuredQuery, Arc<str>>,
}

impl CompileCache {
    /// Creates a cache holding at most `capacity` compiled queries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SyncLruCache::new(capacity),
        }
    }

    /// Returns the cached text for `query`, compiling and caching it on a
    /// miss.
    pub fn get_or_compile(&self, query: &StructuredQuery, compiler: &dyn QueryCompiler) -> Arc<str> {
        if let Some(text) = self.entries.get(query) {
            trace!(table = query.table(), "compile cache hit");
            return text;
        }

        let text: Arc<str> = Arc::from(compiler.compile(query));
        trace!(table = query.table(), query = %text, "compile cache miss");

        if let Some((evicted, _)) = self.entries.insert(query.clone(), Arc::clone(&text)) {
            if evicted != *query {
                trace!(table = evicted.table(), "compile cache eviction");
            }
        }
        text
    }

    /// Returns true if `query` is cached. Does not touch recency.
    pub fn contains(&self, query: &StructuredQuery) -> bool {
        self.entries.contains(query)
    }

    /// Returns the number of cached queries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of cached queries.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Drops every cached query.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns cached queries, most recently used first.
    pub fn queries(&self) -> Vec<StructuredQuery> {
        self.entries.keys()
    }

    /// Returns hit and eviction counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.entries.stats()
    }
}

impl Default for CompileCache {
    fn default() -> Self {
        Self::new(quarry_cache::DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for CompileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Resolves `query` against an explicit context.
///
/// `values` are only consulted for prepared handles.
pub fn resolve_with(
    ctx: &ExecutionContext,
    query: &QueryDescriptor,
    values: &[Value],
) -> QuarryResult<Statement> {
    match query {
        QueryDescriptor::Raw(text) => Ok(Statement::simple(text.as_str())),
        QueryDescriptor::Structured(structured) => {
            let text = ctx.cache().get_or_compile(structured, ctx.compiler());
            Ok(Statement::simple(&*text))
        }
        QueryDescriptor::Prepared(handle) => bind(handle, values).map(Statement::bound),
        QueryDescriptor::Resolved(statement) => Ok(statement.clone()),
    }
}

/// Resolves `query` against the global context.
pub fn resolve(query: &QueryDescriptor, values: &[Value]) -> QuarryResult<Statement> {
    resolve_with(&ExecutionContext::global(), query, values)
}

/// Binds `values` to a prepared handle, in order.
///
/// Fails with [`ErrorKind::Bind`] when the value count differs from the
/// declared parameter count, when a value does not fit its declared type
/// (null fits any type) or when a value cannot be encoded.
pub fn bind(handle: &PreparedHandle, values: &[Value]) -> QuarryResult<BoundStatement> {
    let fail = |violation: BindViolation| {
        wrap(
            violation,
            ErrorContext::new()
                .query(handle.query())
                .prepared(handle.clone())
                .values(values),
            ErrorKind::Bind,
            BIND_FAILED,
        )
    };

    if values.len() != handle.param_count() {
        return Err(fail(BindViolation::Arity {
            expected: handle.param_count(),
            actual: values.len(),
        }));
    }

    let mut encoded = Vec::with_capacity(values.len());
    for (index, (value, expected)) in values.iter().zip(handle.param_types()).enumerate() {
        if !expected.accepts(value) {
            return Err(fail(BindViolation::TypeMismatch {
                index,
                expected: expected.clone(),
                actual: value.clone(),
            }));
        }
        let transport = codec::encode_as(value, expected)
            .map_err(|source| fail(BindViolation::Encode { index, source }))?;
        encoded.push(transport);
    }

    Ok(BoundStatement::new(handle.clone(), encoded))
}

/// Prepares query text against the driver.
///
/// Failures are [`ErrorKind::Prepare`] errors carrying the exact text.
pub fn prepare<S: Session + ?Sized>(session: &S, query: &str) -> QuarryResult<PreparedHandle> {
    session.prepare(query).map_err(|cause| {
        wrap(
            cause,
            ErrorContext::new().query(query),
            ErrorKind::Prepare,
            PREPARE_FAILED,
        )
    })
}

/// Compiles a structured query through the context's cache and prepares the
/// resulting text.
pub fn prepare_structured_with<S: Session + ?Sized>(
    ctx: &ExecutionContext,
    session: &S,
    query: &StructuredQuery,
) -> QuarryResult<PreparedHandle> {
    let text = ctx.cache().get_or_compile(query, ctx.compiler());
    prepare(session, &text)
}

/// [`prepare_structured_with`] against the global context.
pub fn prepare_structured<S: Session + ?Sized>(
    session: &S,
    query: &StructuredQuery,
) -> QuarryResult<PreparedHandle> {
    prepare_structured_with(&ExecutionContext::global(), session, query)
}
