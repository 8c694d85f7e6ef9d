//! Stack-driven loader scheduling.
//!
//! A pipeline starts from root loaders and runs one loader at a time. Each loader reports the
//! failures it recovered from and may emit child loaders, which run depth-first: the first
//! emitted child runs first, and a child's own descendants run before the next sibling.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hoarder_core::context::{Ctx, Errors};
use hoarder_core::error::CoreError;
use hoarder_core::stack::Stack;
use tracing::Instrument;

use crate::error::ServiceError;

/// What a loader produced besides the rows it wrote.
pub struct Loaded<C: ?Sized, S: ?Sized> {
    pub children: Vec<Box<dyn Loader<C, S>>>,
    pub errors: Errors,
}

impl<C: ?Sized, S: ?Sized> Default for Loaded<C, S> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            errors: Errors::new(),
        }
    }
}

impl<C: ?Sized, S: ?Sized> Loaded<C, S> {
    #[must_use]
    pub fn errors(errors: Errors) -> Self {
        Self {
            children: Vec::new(),
            errors,
        }
    }
}

/// Pulls one entity family from the client `C` into the store `S`.
#[async_trait]
pub trait Loader<C: ?Sized, S: ?Sized>: Send + Sync {
    /// Name of the table the loader fills; used as the `entity` breadcrumb.
    fn table_name(&self) -> &'static str;

    async fn load(&self, ctx: &Ctx, client: &C, store: &S) -> Loaded<C, S>;
}

/// ## Summary
/// Runs `roots` and everything they emit until the stack is empty or `ctx` is cancelled.
///
/// Loader failures never stop the pipeline; they are returned together. Cancellation stops it
/// and is reported once.
pub async fn run<C, S>(
    ctx: &Ctx,
    client: &C,
    store: &S,
    roots: Vec<Box<dyn Loader<C, S>>>,
) -> Errors
where
    C: ?Sized + Sync,
    S: ?Sized + Sync,
{
    let mut stack = Stack::new();
    stack.push_all(roots);
    let mut errors = Errors::new();

    while let Some(loader) = stack.pop() {
        if ctx.is_cancelled() {
            break;
        }

        let ctx = ctx.with("entity", loader.table_name());
        let span = ctx.span();
        let loaded = async {
            tracing::debug!("Loading");
            loader.load(&ctx, client, store).await
        }
        .instrument(span)
        .await;

        errors.extend(loaded.errors);
        stack.push_all(loaded.children);
    }

    if ctx.is_cancelled() {
        ctx.error(&mut errors, CoreError::Cancelled, "pipeline stopped");
    }
    errors
}

/// ## Summary
/// Reports a failed step unless it failed because the context was cancelled; the pipeline
/// reports cancellation itself.
pub fn check<T, E>(ctx: &Ctx, errors: &mut Errors, result: Result<T, E>, msg: &str) -> Option<T>
where
    E: Into<ServiceError>,
{
    match result.map_err(Into::into) {
        Ok(value) => Some(value),
        Err(err) if err.is_cancelled() => None,
        Err(err) => {
            ctx.error(errors, err, msg);
            None
        }
    }
}

/// ## Summary
/// First instant to reload from: `overlap` before the last stored `checkpoint`, never before
/// the epoch. Without a checkpoint everything is loaded.
#[must_use]
pub fn window_start(checkpoint: Option<DateTime<Utc>>, overlap: Duration) -> DateTime<Utc> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    checkpoint
        .and_then(|checkpoint| {
            TimeDelta::from_std(overlap)
                .ok()
                .and_then(|overlap| checkpoint.checked_sub_signed(overlap))
        })
        .map_or(epoch, |start| start.max(epoch))
}

/// Converts a page length for comparison with the requested limit.
#[must_use]
pub fn page_len<T>(items: &[T]) -> i64 {
    i64::try_from(items.len()).unwrap_or(i64::MAX)
}

/// ## Summary
/// Calls `page(cursor, batch_size)` until it returns no next cursor, starting at `start`.
///
/// A page returns `Err` with the failures it reported to stop the iteration; those failures
/// are returned. Cancellation stops the iteration silently.
pub async fn paginate<K, F, Fut>(ctx: &Ctx, start: K, batch_size: i64, mut page: F) -> Errors
where
    K: Display,
    F: FnMut(K, i64) -> Fut,
    Fut: Future<Output = Result<Option<K>, Errors>>,
{
    let mut cursor = start;
    loop {
        if ctx.is_cancelled() {
            return Errors::new();
        }
        tracing::debug!(cursor = %cursor, batch_size, "Loading page");
        match page(cursor, batch_size).await {
            Ok(Some(next)) => cursor = next,
            Ok(None) => return Errors::new(),
            Err(errors) => return errors,
        }
    }
}
