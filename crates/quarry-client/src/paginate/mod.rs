//! Lazy pagination.
//!
//! A [`Paginator`] walks a sequence of pages one row at a time. Once a page
//! arrives the continuation decides whether there is a next page and which
//! query fetches it; that page executes only when the current one has been
//! drained and the caller asks for another row.

use std::fmt;
use std::iter::FusedIterator;
use std::mem;
use std::vec;

use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::executor;
use crate::options::ExecutionOptions;
use crate::session::Session;
use crate::statement::QueryDescriptor;
use crate::value::Row;

enum State {
    /// The next page has not been executed yet.
    Pending(QueryDescriptor),
    /// Rows of the current page are being handed out. `next` is the query
    /// of the following page, if any.
    Streaming {
        rows: vec::IntoIter<Row>,
        next: Option<QueryDescriptor>,
    },
    Done,
}

/// Lazily concatenates pages of rows.
///
/// Each page runs through the blocking execution style with the same
/// options. The first failure is yielded once and ends the sequence.
pub struct Paginator<'s, S: ?Sized, F> {
    ctx: ExecutionContext,
    session: &'s S,
    options: ExecutionOptions,
    continuation: F,
    state: State,
    pages_fetched: usize,
}

impl<'s, S, F> Paginator<'s, S, F>
where
    S: Session + ?Sized,
    F: FnMut(&QueryDescriptor, &[Row]) -> Option<QueryDescriptor>,
{
    /// Returns how many pages have been executed so far, failed ones
    /// included.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Returns true once the sequence has ended.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn fetch(&mut self, query: QueryDescriptor) -> Option<Result<Row, ExecutionError>> {
        self.pages_fetched += 1;
        trace!(page = self.pages_fetched, "fetching page");

        match executor::execute_with(&self.ctx, self.session, &query, &self.options) {
            Ok(chunk) => {
                let next = (self.continuation)(&query, &chunk);
                self.state = State::Streaming {
                    rows: chunk.into_iter(),
                    next,
                };
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'s, S, F> Iterator for Paginator<'s, S, F>
where
    S: Session + ?Sized,
    F: FnMut(&QueryDescriptor, &[Row]) -> Option<QueryDescriptor>,
{
    type Item = Result<Row, ExecutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Pending(query) => {
                    if let Some(failure) = self.fetch(query) {
                        return Some(failure);
                    }
                }
                State::Streaming { mut rows, next } => {
                    if let Some(row) = rows.next() {
                        self.state = State::Streaming { rows, next };
                        return Some(Ok(row));
                    }

                    match next {
                        Some(query) => self.state = State::Pending(query),
                        None => {
                            trace!(pages = self.pages_fetched, "pagination finished");
                            return None;
                        }
                    }
                }
            }
        }
    }
}

impl<'s, S, F> FusedIterator for Paginator<'s, S, F>
where
    S: Session + ?Sized,
    F: FnMut(&QueryDescriptor, &[Row]) -> Option<QueryDescriptor>,
{
}

impl<'s, S: ?Sized, F> fmt::Debug for Paginator<'s, S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "pending",
            State::Streaming { .. } => "streaming",
            State::Done => "done",
        };
        f.debug_struct("Paginator")
            .field("state", &state)
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}

/// Starts a lazy pagination over `first` and its continuations.
///
/// Nothing executes until the first call to `next`. As each page arrives,
/// `continuation(&last_query, &last_chunk)` returns the next page's query
/// or `None` to stop. The next page runs once the current one is drained.
pub fn paginate_with<'s, S, Q, F>(
    ctx: &ExecutionContext,
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
    Paginator {
        ctx: ctx.clone(),
        session,
        options,
        continuation,
        state: State::Pending(first.into()),
        pages_fetched: 0,
    }
}

/// [`paginate_with`] against the global context.
pub fn paginate<'s, S, Q, F>(
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
    paginate_with(&ExecutionContext::global(), session, first, continuation, options)
}
