//! Execution coordinator.
//!
//! One pipeline, three styles. Every style resolves the query, applies the
//! options, submits the statement and decodes the rows the same way; they
//! differ only in how the result reaches the caller:
//!
//! - [`execute`] blocks and returns the rows
//! - [`execute_async`] returns at once and later calls exactly one of two
//!   handlers
//! - [`execute_chan`] returns a single-use channel that receives exactly one
//!   [`Outcome`]
//!
//! Completions of the last two run on the runtime named by
//! [`ExecutionOptions::executor`], or on a shared default pool built the
//! first time it is needed.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::codec;
use crate::context::{ExecutionContext, ExecutionStats};
use crate::error::{
    wrap, DriverResult, ErrorContext, ErrorKind, ExecutionError, QuarryResult, EXECUTE_FAILED,
};
use crate::options::{self, ExecutionOptions};
use crate::resolver;
use crate::session::{ResultSet, Session};
use crate::statement::{QueryDescriptor, Statement};
use crate::value::{Row, Value};

/// Thread name of the default completion pool.
pub const DEFAULT_POOL_NAME: &str = "quarry-callback";

static DEFAULT_POOL: Mutex<Option<Runtime>> = parking_lot::const_mutex(None);

/// Returns the shared completion pool, building it on first use.
pub fn default_executor() -> io::Result<Handle> {
    default_executor_with(None)
}

/// Returns the shared completion pool, building it with `threads` workers
/// if it does not exist yet. Later calls return the existing pool whatever
/// `threads` says.
pub fn default_executor_with(threads: Option<usize>) -> io::Result<Handle> {
    let mut pool = DEFAULT_POOL.lock();
    if let Some(runtime) = pool.as_ref() {
        return Ok(runtime.handle().clone());
    }

    let mut builder = Builder::new_multi_thread();
    builder.thread_name(DEFAULT_POOL_NAME).enable_all();
    if let Some(threads) = threads {
        builder.worker_threads(threads.max(1));
    }
    let runtime = builder.build()?;
    debug!(threads = ?threads, "started default completion pool");

    let handle = runtime.handle().clone();
    *pool = Some(runtime);
    Ok(handle)
}

/// The single value delivered by [`execute_chan`].
///
/// Success and failure travel on the same channel; inspect the tag to tell
/// them apart.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Decoded rows.
    Rows(Vec<Row>),
    /// The execution failed.
    Failed(ExecutionError),
}

impl Outcome {
    /// Returns true for [`Outcome::Failed`].
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Returns the failure kind, if this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(ExecutionError::kind)
    }

    /// Returns the rows, if this is a success.
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Outcome::Rows(rows) => Some(rows),
            Outcome::Failed(_) => None,
        }
    }

    /// Returns the error, if this is a failure.
    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            Outcome::Rows(_) => None,
            Outcome::Failed(err) => Some(err),
        }
    }
}

impl From<QuarryResult<Vec<Row>>> for Outcome {
    fn from(result: QuarryResult<Vec<Row>>) -> Self {
        match result {
            Ok(rows) => Outcome::Rows(rows),
            Err(err) => Outcome::Failed(err),
        }
    }
}

/// Handle on a callback-style execution.
///
/// Dropping it does not cancel the execution.
#[derive(Debug)]
pub struct PendingExecution {
    task: Option<JoinHandle<()>>,
}

impl PendingExecution {
    fn finished() -> Self {
        Self { task: None }
    }

    /// Returns true once the handler has run.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Aborts the execution if it has not completed. An aborted execution
    /// still completes once, through the error path, with an interrupted
    /// cause.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Waits for the handler to run.
    ///
    /// Fails if the handler panicked or the execution was aborted.
    pub async fn wait(self) -> Result<(), JoinError> {
        match self.task {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

/// Completion for a spawned execution.
///
/// Runs `done` exactly once. If the task is dropped before it finishes
/// (aborted, or refused by a runtime that has shut down) the drop reports
/// an interrupted execution instead.
struct Completion<D>
where
    D: FnOnce(QuarryResult<Vec<Row>>),
{
    done: Option<D>,
    stats: Arc<ExecutionStats>,
    style: &'static str,
    statement: Statement,
    values: Vec<Value>,
}

impl<D> Completion<D>
where
    D: FnOnce(QuarryResult<Vec<Row>>),
{
    fn finish(mut self, result: DriverResult<ResultSet>, string_keys: bool) {
        let result = complete(&self.statement, result, string_keys, &self.values);
        self.run(result);
    }

    fn run(&mut self, result: QuarryResult<Vec<Row>>) {
        if let Some(done) = self.done.take() {
            record(&self.stats, self.style, &result);
            done(result);
        }
    }
}

impl<D> Drop for Completion<D>
where
    D: FnOnce(QuarryResult<Vec<Row>>),
{
    fn drop(&mut self) {
        if self.done.is_none() {
            return;
        }
        let cause = io::Error::new(
            io::ErrorKind::Interrupted,
            "execution dropped before completion",
        );
        let context = ErrorContext::for_statement(&self.statement).values(&self.values);
        self.run(Err(wrap(cause, context, ErrorKind::Execute, EXECUTE_FAILED)));
    }
}

/// Resolves and configures the statement for one call.
fn submit(
    ctx: &ExecutionContext,
    query: &QueryDescriptor,
    options: &ExecutionOptions,
) -> QuarryResult<Statement> {
    ctx.stats().record_submit();
    let mut statement = resolver::resolve_with(ctx, query, &options.values)?;
    options::apply(&mut statement, options);
    Ok(statement)
}

/// Wraps driver failures and decodes the rows.
fn complete(
    statement: &Statement,
    result: DriverResult<ResultSet>,
    string_keys: bool,
    values: &[Value],
) -> QuarryResult<Vec<Row>> {
    let context = || ErrorContext::for_statement(statement).values(values);
    let result = result.map_err(|cause| wrap(cause, context(), ErrorKind::Execute, EXECUTE_FAILED))?;
    codec::decode_rows(&result, string_keys)
        .map_err(|cause| wrap(cause, context(), ErrorKind::Execute, EXECUTE_FAILED))
}

fn record(stats: &ExecutionStats, style: &str, result: &QuarryResult<Vec<Row>>) {
    match result {
        Ok(rows) => {
            stats.record_success();
            debug!(style, rows = rows.len(), "execution succeeded");
        }
        Err(err) => {
            stats.record_failure(err.kind());
            warn!(style, kind = %err.kind(), error = %err, "execution failed");
        }
    }
}

fn log_submit(style: &str, query: &QueryDescriptor, statement: &Statement) {
    debug!(
        style,
        descriptor = query.variant_name(),
        prepared = statement.is_prepared(),
        query = statement.query_text(),
        "submitting statement"
    );
}

/// Executes `query`, blocking until the rows are decoded.
pub fn execute_with<S, Q>(
    ctx: &ExecutionContext,
    session: &S,
    query: Q,
    options: &ExecutionOptions,
) -> QuarryResult<Vec<Row>>
where
    S: Session + ?Sized,
    Q: Into<QueryDescriptor>,
{
    let query = query.into();
    let result = submit(ctx, &query, options).and_then(|statement| {
        log_submit("blocking", &query, &statement);
        let result = session.execute(&statement);
        complete(&statement, result, options.string_keys, &options.values)
    });
    record(ctx.stats(), "blocking", &result);
    result
}

/// [`execute_with`] against the global context.
pub fn execute<S, Q>(session: &S, query: Q, options: &ExecutionOptions) -> QuarryResult<Vec<Row>>
where
    S: Session + ?Sized,
    Q: Into<QueryDescriptor>,
{
    execute_with(&ExecutionContext::global(), session, query, options)
}

/// Submits the statement and runs `done` with the result on the completion
/// runtime. Resolution failures run `done` on the calling thread.
fn dispatch<S, D>(
    ctx: &ExecutionContext,
    session: &S,
    query: QueryDescriptor,
    options: &ExecutionOptions,
    style: &'static str,
    done: D,
) -> PendingExecution
where
    S: Session + ?Sized,
    D: FnOnce(QuarryResult<Vec<Row>>) + Send + 'static,
{
    let stats = ctx.shared_stats();

    let statement = match submit(ctx, &query, options) {
        Ok(statement) => statement,
        Err(err) => {
            let result = Err(err);
            record(&stats, style, &result);
            done(result);
            return PendingExecution::finished();
        }
    };

    let runtime = match options.executor.clone() {
        Some(handle) => Ok(handle),
        None => default_executor(),
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(cause) => {
            let result = Err(wrap(
                cause,
                ErrorContext::for_statement(&statement).values(&options.values),
                ErrorKind::Execute,
                EXECUTE_FAILED,
            ));
            record(&stats, style, &result);
            done(result);
            return PendingExecution::finished();
        }
    };

    log_submit(style, &query, &statement);
    let pending = session.execute_async(statement.clone());
    let string_keys = options.string_keys;
    let completion = Completion {
        done: Some(done),
        stats,
        style,
        statement,
        values: options.values.clone(),
    };

    let task = runtime.spawn(async move {
        let result = pending.await;
        completion.finish(result, string_keys);
    });

    PendingExecution { task: Some(task) }
}

/// Executes `query` without blocking and reports through handlers.
///
/// Exactly one of `on_success` and `on_error` runs, once. If the query
/// cannot be resolved, `on_error` runs before this returns and the returned
/// handle is already finished.
pub fn execute_async_with<S, Q, F, E>(
    ctx: &ExecutionContext,
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
    dispatch(ctx, session, query.into(), options, "callback", move |result| {
        match result {
            Ok(rows) => on_success(rows),
            Err(err) => on_error(err),
        }
    })
}

/// [`execute_async_with`] against the global context.
pub fn execute_async<S, Q, F, E>(
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
    execute_async_with(
        &ExecutionContext::global(),
        session,
        query,
        options,
        on_success,
        on_error,
    )
}

/// Executes `query` without blocking and delivers the result on a channel.
///
/// The channel receives exactly one [`Outcome`] and then closes. Resolution
/// failures are sent before this returns.
pub fn execute_chan_with<S, Q>(
    ctx: &ExecutionContext,
    session: &S,
    query: Q,
    options: &ExecutionOptions,
) -> oneshot::Receiver<Outcome>
where
    S: Session + ?Sized,
    Q: Into<QueryDescriptor>,
{
    let (tx, rx) = oneshot::channel();
    dispatch(ctx, session, query.into(), options, "channel", move |result| {
        // The receiver may already be gone; nobody is left to tell.
        let _ = tx.send(Outcome::from(result));
    });
    rx
}

/// [`execute_chan_with`] against the global context.
pub fn execute_chan<S, Q>(
    session: &S,
    query: Q,
    options: &ExecutionOptions,
) -> oneshot::Receiver<Outcome>
where
    S: Session + ?Sized,
    Q: Into<QueryDescriptor>,
{
    execute_chan_with(&ExecutionContext::global(), session, query, options)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::error::DriverError;
    use crate::options::Consistency;
    use crate::statement::{PreparedHandle, PreparedId};
    use crate::testing::MockSession;
    use crate::value::ValueType;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn stopped_runtime() -> Handle {
        let runtime = Builder::new_current_thread().build().unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);
        handle
    }

    #[test]
    fn test_stopped_executor_reports_error_once() {
        let ctx = ExecutionContext::new();
        let session = two_rows();
        let options = ExecutionOptions::new().executor(stopped_runtime());

        let (tx, rx) = mpsc::channel();
        let err_tx = tx.clone();
        execute_async_with(
            &ctx,
            &session,
            "SELECT * FROM t",
            &options,
            move |rows| {
                let _ = tx.send(Ok(rows.len()));
            },
            move |err| {
                let _ = err_tx.send(Err(err));
            },
        );

        let err = rx.recv_timeout(TIMEOUT).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execute);
        assert_eq!(err.query(), Some("SELECT * FROM t"));
        assert_eq!(
            err.cause_as::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::Interrupted)
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(ctx.stats().snapshot().execute_failures, 1);
    }

    #[test]
    fn test_stopped_executor_still_sends_outcome() {
        let ctx = ExecutionContext::new();
        let options = ExecutionOptions::new().executor(stopped_runtime());

        let rx = execute_chan_with(&ctx, &two_rows(), "SELECT * FROM t", &options);
        let outcome = rx.blocking_recv().unwrap();

        assert!(outcome.is_error());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Execute));
    }

    fn two_rows() -> MockSession {
        MockSession::new().with_rows(
            "SELECT * FROM t",
            vec![
                vec![("id", Value::Integer(1)), ("name", Value::from("a"))],
                vec![("id", Value::Integer(2)), ("name", Value::from("b"))],
            ],
        )
    }

    #[test]
    fn test_execute_blocking() {
        let ctx = ExecutionContext::new();
        let rows = execute_with(&ctx, &two_rows(), "SELECT * FROM t", &ExecutionOptions::new())
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_as::<i64>("id"), Some(1));
        assert_eq!(rows[1].get_as::<String>("name"), Some("b".to_string()));
        assert_eq!(ctx.stats().snapshot().succeeded, 1);
    }

    #[test]
    fn test_options_reach_driver() {
        let ctx = ExecutionContext::new();
        let session = two_rows();
        let options = ExecutionOptions::new()
            .consistency(Consistency::Quorum)
            .fetch_size(50);

        execute_with(&ctx, &session, "SELECT * FROM t", &options).unwrap();

        let executed = session.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].settings().consistency, Some(Consistency::Quorum));
        assert_eq!(executed[0].settings().fetch_size, Some(50));
    }

    #[test]
    fn test_execute_failure_is_wrapped() {
        let ctx = ExecutionContext::new();
        let session = MockSession::new().fail_execute();
        let err = execute_with(&ctx, &session, "SELECT * FROM t", &ExecutionOptions::new())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Execute);
        assert_eq!(err.message(), EXECUTE_FAILED);
        assert_eq!(err.statement().map(Statement::query_text), Some("SELECT * FROM t"));
        assert!(matches!(
            err.cause_as::<DriverError>(),
            Some(DriverError::Unavailable(_))
        ));
        assert_eq!(ctx.stats().snapshot().execute_failures, 1);
    }

    #[test]
    fn test_bind_failure_never_reaches_driver() {
        let ctx = ExecutionContext::new();
        let session = MockSession::new();
        let handle = PreparedHandle::new(
            PreparedId::new(vec![7]),
            "SELECT * FROM t WHERE id = ?",
            vec![ValueType::BigInt],
        );

        let err = execute_with(&ctx, &session, handle, &ExecutionOptions::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bind);
        assert!(session.executed().is_empty());
    }

    #[test]
    fn test_callback_success_on_default_pool() {
        let ctx = ExecutionContext::new();
        let (tx, rx) = mpsc::channel();
        let err_tx = tx.clone();

        execute_async_with(
            &ctx,
            &two_rows(),
            "SELECT * FROM t",
            &ExecutionOptions::new(),
            move |rows| tx.send(Ok(rows.len())).unwrap(),
            move |err| err_tx.send(Err(err.kind())).unwrap(),
        );

        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Ok(2));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_callback_resolution_failure_is_synchronous() {
        let ctx = ExecutionContext::new();
        let handle = PreparedHandle::new(PreparedId::new(vec![1]), "SELECT ?", vec![ValueType::Text]);
        let (tx, rx) = mpsc::channel();

        let pending = execute_async_with(
            &ctx,
            &MockSession::new(),
            handle,
            &ExecutionOptions::new().values([1]),
            |_| panic!("success handler must not run"),
            move |err| tx.send(err.kind()).unwrap(),
        );

        assert!(pending.is_finished());
        assert_eq!(rx.try_recv().unwrap(), ErrorKind::Bind);
    }

    #[tokio::test]
    async fn test_callback_on_supplied_runtime() {
        let ctx = ExecutionContext::new();
        let (tx, rx) = oneshot::channel();
        let options = ExecutionOptions::new().executor(Handle::current());

        let pending = execute_async_with(
            &ctx,
            &MockSession::new().fail_execute(),
            "SELECT * FROM t",
            &options,
            |_| panic!("success handler must not run"),
            move |err| {
                let _ = tx.send(err);
            },
        );

        pending.wait().await.unwrap();
        let err = rx.await.unwrap();
        assert_eq!(err.kind(), ErrorKind::Execute);
    }

    #[tokio::test]
    async fn test_channel_delivers_rows() {
        let ctx = ExecutionContext::new();
        let options = ExecutionOptions::new().executor(Handle::current());

        let outcome = execute_chan_with(&ctx, &two_rows(), "SELECT * FROM t", &options)
            .await
            .unwrap();

        assert!(!outcome.is_error());
        assert_eq!(outcome.rows().map(<[Row]>::len), Some(2));
    }

    #[tokio::test]
    async fn test_channel_delivers_failure() {
        let ctx = ExecutionContext::new();
        let options = ExecutionOptions::new().executor(Handle::current());

        let outcome = execute_chan_with(
            &ctx,
            &MockSession::new().fail_execute(),
            "SELECT * FROM t",
            &options,
        )
        .await
        .unwrap();

        assert!(outcome.is_error());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Execute));
    }

    #[test]
    fn test_channel_resolution_failure_is_immediate() {
        let ctx = ExecutionContext::new();
        let handle = PreparedHandle::new(PreparedId::new(vec![1]), "SELECT ?", vec![ValueType::BigInt]);

        let mut rx = execute_chan_with(&ctx, &MockSession::new(), handle, &ExecutionOptions::new());
        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Bind));
    }

    #[test]
    fn test_default_pool_threads() {
        let handle = default_executor_with(Some(1)).unwrap();
        let name = handle
            .block_on(handle.spawn(async { std::thread::current().name().map(str::to_string) }))
            .unwrap();
        assert_eq!(name.as_deref(), Some(DEFAULT_POOL_NAME));
    }
}
