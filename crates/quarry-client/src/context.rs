//! Execution context.
//!
//! An [`ExecutionContext`] owns the pieces of state the pipeline shares
//! between calls: the structured-query compiler, the compilation cache and
//! execution counters. Contexts are cheap to clone; clones share state.
//!
//! Every operation in this crate has a `*_with` form taking a context and a
//! plain form using the process-wide default returned by
//! [`ExecutionContext::global`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::error::{ErrorKind, ExecutionError, QuarryResult};
use crate::executor::{self, Outcome, PendingExecution};
use crate::options::ExecutionOptions;
use crate::paginate::{self, Paginator};
use crate::query::{CqlCompiler, QueryCompiler, StructuredQuery};
use crate::resolver::{self, CompileCache};
use crate::session::Session;
use crate::statement::{PreparedHandle, QueryDescriptor, Statement};
use crate::value::{Row, Value};

static GLOBAL: RwLock<Option<ExecutionContext>> = parking_lot::const_rwlock(None);

/// Shared state of the execution pipeline.
#[derive(Clone)]
pub struct ExecutionContext {
    compiler: Arc<dyn QueryCompiler>,
    cache: Arc<CompileCache>,
    stats: Arc<ExecutionStats>,
}

impl ExecutionContext {
    /// Creates a context with the CQL compiler and a default-sized cache.
    pub fn new() -> Self {
        Self::with_capacity(quarry_cache::DEFAULT_CAPACITY)
    }

    /// Creates a context with the CQL compiler and a cache of `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_compiler(CqlCompiler, capacity)
    }

    /// Creates a context with a custom compiler.
    pub fn with_compiler<C: QueryCompiler + 'static>(compiler: C, capacity: usize) -> Self {
        Self {
            compiler: Arc::new(compiler),
            cache: Arc::new(CompileCache::new(capacity)),
            stats: Arc::new(ExecutionStats::default()),
        }
    }

    /// Creates a context sized by `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_capacity(config.compile_cache_capacity)
    }

    /// Returns the process-wide context, creating it on first use.
    pub fn global() -> ExecutionContext {
        if let Some(ctx) = GLOBAL.read().as_ref() {
            return ctx.clone();
        }
        GLOBAL.write().get_or_insert_with(ExecutionContext::new).clone()
    }

    /// Replaces the process-wide context, returning the previous one.
    ///
    /// Calls already holding a clone of the old context keep using it.
    pub fn set_global(ctx: ExecutionContext) -> Option<ExecutionContext> {
        GLOBAL.write().replace(ctx)
    }

    /// Returns the compiler.
    pub fn compiler(&self) -> &dyn QueryCompiler {
        &*self.compiler
    }

    /// Returns the compilation cache.
    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// Returns execution counters.
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub(crate) fn shared_stats(&self) -> Arc<ExecutionStats> {
        Arc::clone(&self.stats)
    }

    /// Resolves a query descriptor. See [`resolver::resolve_with`].
    pub fn resolve(&self, query: &QueryDescriptor, values: &[Value]) -> QuarryResult<Statement> {
        resolver::resolve_with(self, query, values)
    }

    /// Compiles and prepares a structured query.
    pub fn prepare<S: Session + ?Sized>(
        &self,
        session: &S,
        query: &StructuredQuery,
    ) -> QuarryResult<PreparedHandle> {
        resolver::prepare_structured_with(self, session, query)
    }

    /// Blocking execution. See [`executor::execute_with`].
    pub fn execute<S, Q>(
        &self,
        session: &S,
        query: Q,
        options: &ExecutionOptions,
    ) -> QuarryResult<Vec<Row>>
    where
        S: Session + ?Sized,
        Q: Into<QueryDescriptor>,
    {
        executor::execute_with(self, session, query, options)
    }

    /// Callback execution. See [`executor::execute_async_with`].
    pub fn execute_async<S, Q, F, E>(
        &self,
        session: &S,
        query: Q,
        options: &ExecutionOptions,
        on_success: F,
        on_error: E,
    ) -> PendingExecution
    where
        S: Session + ?Sized,
        Q: Into<QueryDescriptor>,
        F: FnOnce(Vec<Row>) + Send + 'static,
        E: FnOnce(ExecutionError) + Send + 'static,
    {
        executor::execute_async_with(self, session, query, options, on_success, on_error)
    }

    /// Channel execution. See [`executor::execute_chan_with`].
    pub fn execute_chan<S, Q>(
        &self,
        session: &S,
        query: Q,
        options: &ExecutionOptions,
    ) -> oneshot::Receiver<Outcome>
    where
        S: Session + ?Sized,
        Q: Into<QueryDescriptor>,
    {
        executor::execute_chan_with(self, session, query, options)
    }

    /// Lazy pagination. See [`paginate::paginate_with`].
    pub fn paginate<'s, S, Q, F>(
        &self,
        session: &'s S,
        first: Q,
        continuation: F,
        options: ExecutionOptions,
    ) -> Paginator<'s, S, F>
    where
        S: Session + ?Sized,
        Q: Into<QueryDescriptor>,
        F: FnMut(&QueryDescriptor, &[Row]) -> Option<QueryDescriptor>,
    {
        paginate::paginate_with(self, session, first, continuation, options)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cache", &self.cache)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Execution counters.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    prepare_failures: AtomicU64,
    bind_failures: AtomicU64,
    execute_failures: AtomicU64,
}

impl ExecutionStats {
    pub(crate) fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::Prepare => &self.prepare_failures,
            ErrorKind::Bind => &self.bind_failures,
            ErrorKind::Execute => &self.execute_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of submitted executions.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            prepare_failures: self.prepare_failures.load(Ordering::Relaxed),
            bind_failures: self.bind_failures.load(Ordering::Relaxed),
            execute_failures: self.execute_failures.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.prepare_failures.store(0, Ordering::Relaxed);
        self.bind_failures.store(0, Ordering::Relaxed);
        self.execute_failures.store(0, Ordering::Relaxed);
    }
}

/// A copy of [`ExecutionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStatsSnapshot {
    /// Executions submitted.
    pub submitted: u64,
    /// Executions that produced rows.
    pub succeeded: u64,
    /// Prepare failures.
    pub prepare_failures: u64,
    /// Bind failures.
    pub bind_failures: u64,
    /// Execute failures.
    pub execute_failures: u64,
}

impl ExecutionStatsSnapshot {
    /// Returns the total number of failures.
    pub fn failures(&self) -> u64 {
        self.prepare_failures + self.bind_failures + self.execute_failures
    }
}
