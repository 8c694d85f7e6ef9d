//! Task context: breadcrumb path, cancellation, ask-function and held locks.
//!
//! Every loader, job and trigger receives a [`Ctx`]. Child contexts are derived with
//! [`Ctx::with`], which extends the breadcrumb used both as the `path` field of the
//! tracing span and as the prefix of every reported error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::{CoreError, CoreResult};

/// Trigger-specific callback that delivers a prompt to a human and returns the reply.
pub type AskFn = Arc<dyn Fn(Ctx, String) -> BoxFuture<'static, CoreResult<String>> + Send + Sync>;

/// ## Summary
/// Wraps an async closure into an [`AskFn`].
pub fn ask_fn<F, Fut>(f: F) -> AskFn
where
    F: Fn(Ctx, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<String>> + Send + 'static,
{
    Arc::new(move |ctx, prompt| Box::pin(f(ctx, prompt)))
}

/// Hierarchical cancellation handle. Cancelling a parent cancels all of its children.
#[derive(Clone)]
pub struct Cancellation {
    node: Arc<CancelNode>,
}

struct CancelNode {
    tx: watch::Sender<bool>,
    parent: Option<Cancellation>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Self>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            node: Arc::new(CancelNode { tx, parent }),
        }
    }

    /// Returns a handle that is cancelled together with `self`, but can also be cancelled alone.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    pub fn cancel(&self) {
        self.node.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.node.tx.borrow() || self.node.parent.as_ref().is_some_and(Self::is_cancelled)
    }

    /// ## Summary
    /// Resolves once this handle or any of its ancestors is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.node.tx.subscribe();
            let own = async move {
                // The sender lives as long as `self`, so this only returns on cancel.
                rx.wait_for(|cancelled| *cancelled).await.ok();
            };

            match &self.node.parent {
                Some(parent) => {
                    tokio::select! {
                        () = own => {}
                        () = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        })
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct HeldLock {
    lock: u64,
    level: u8,
    next: Option<Arc<HeldLock>>,
}

/// Execution context threaded through every task.
#[derive(Clone)]
pub struct Ctx {
    path: Arc<Vec<(&'static str, String)>>,
    cancel: Cancellation,
    ask: Option<AskFn>,
    held: Option<Arc<HeldLock>>,
}

impl Default for Ctx {
    fn default() -> Self {
        Self::background()
    }
}

impl Ctx {
    /// ## Summary
    /// Creates a root context with a fresh cancellation handle.
    #[must_use]
    pub fn background() -> Self {
        Self::with_cancellation(Cancellation::new())
    }

    #[must_use]
    pub fn with_cancellation(cancel: Cancellation) -> Self {
        Self {
            path: Arc::new(Vec::new()),
            cancel,
            ask: None,
            held: None,
        }
    }

    /// ## Summary
    /// Returns a child context whose breadcrumb is extended with `key=value`.
    #[must_use]
    pub fn with(&self, key: &'static str, value: impl fmt::Display) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend(self.path.iter().cloned());
        path.push((key, value.to_string()));
        Self {
            path: Arc::new(path),
            ..self.clone()
        }
    }

    /// ## Summary
    /// Returns a child context with its own cancellation handle.
    ///
    /// Cancelling the returned handle cancels only the child; cancelling `self` cancels both.
    #[must_use]
    pub fn child(&self) -> (Self, Cancellation) {
        let cancel = self.cancel.child();
        (
            Self {
                cancel: cancel.clone(),
                ..self.clone()
            },
            cancel,
        )
    }

    #[must_use]
    pub fn breadcrumb(&self) -> Breadcrumb<'_> {
        Breadcrumb(&self.path)
    }

    /// Value of the last breadcrumb entry with the given key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.path
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// ## Summary
    /// Builds a tracing span carrying the breadcrumb as its `path` field.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("task", path = %self.breadcrumb())
    }

    #[must_use]
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// ## Summary
    /// Returns `Err(Cancelled)` if the context is already cancelled.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] when cancelled.
    pub fn err(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// ## Summary
    /// Drives `fut` to completion unless the context is cancelled first.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] if cancellation wins; the future is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> CoreResult<F::Output> {
        self.err()?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CoreError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// ## Summary
    /// Sleeps for `duration` unless cancelled.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] if the context is cancelled during the wait.
    pub async fn sleep(&self, duration: Duration) -> CoreResult<()> {
        self.run(tokio::time::sleep(duration)).await
    }

    #[must_use]
    pub fn with_ask_fn(&self, ask: AskFn) -> Self {
        Self {
            ask: Some(ask),
            ..self.clone()
        }
    }

    /// ## Summary
    /// Decorates the attached ask-function. Contexts without one are returned unchanged.
    #[must_use]
    pub fn apply_ask_fn(&self, wrap: impl FnOnce(AskFn) -> AskFn) -> Self {
        match &self.ask {
            Some(ask) => self.with_ask_fn(wrap(Arc::clone(ask))),
            None => self.clone(),
        }
    }

    #[must_use]
    pub fn has_ask_fn(&self) -> bool {
        self.ask.is_some()
    }

    /// ## Summary
    /// Asks the human behind the current trigger and waits for the reply.
    ///
    /// ## Errors
    /// Returns [`CoreError::NoAskFn`] when the trigger cannot prompt, [`CoreError::Cancelled`]
    /// on cancellation, or whatever the ask-function itself reports.
    pub async fn ask(&self, prompt: impl Into<String>) -> CoreResult<String> {
        let ask = self.ask.as_ref().ok_or(CoreError::NoAskFn)?;
        self.run(ask(self.clone(), prompt.into())).await?
    }

    /// ## Summary
    /// Reports a recoverable failure: logs it and appends a breadcrumb-prefixed message.
    pub fn error(&self, errs: &mut Errors, err: impl fmt::Display, msg: &str) {
        tracing::error!(path = %self.breadcrumb(), error = %err, "{msg}");
        if self.path.is_empty() {
            errs.push(format!("{msg}: {err}"));
        } else {
            errs.push(format!("{}: {msg}: {err}", self.breadcrumb()));
        }
    }

    /// ## Summary
    /// Unwraps `result`, reporting the error through [`Ctx::error`] when it failed.
    pub fn check<T, E: fmt::Display>(
        &self,
        errs: &mut Errors,
        result: Result<T, E>,
        msg: &str,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.error(errs, err, msg);
                None
            }
        }
    }

    pub(crate) fn held_level(&self, lock: u64) -> Option<u8> {
        let mut node = self.held.as_deref();
        while let Some(held) = node {
            if held.lock == lock {
                return Some(held.level);
            }
            node = held.next.as_deref();
        }
        None
    }

    pub(crate) fn holding(&self, lock: u64, level: u8) -> Self {
        Self {
            held: Some(Arc::new(HeldLock {
                lock,
                level,
                next: self.held.clone(),
            })),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("path", &self.breadcrumb().to_string())
            .field("cancelled", &self.is_cancelled())
            .field("ask", &self.ask.is_some())
            .finish_non_exhaustive()
    }
}

/// Display adapter for the breadcrumb path: `key=value key=value`.
pub struct Breadcrumb<'a>(&'a [(&'static str, String)]);

impl fmt::Display for Breadcrumb<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Accumulator of reported, non-fatal failures.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Errors(Vec<String>);

impl Errors {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// ## Summary
    /// Converts the accumulator into a `Result`, failing when anything was reported.
    ///
    /// ## Errors
    /// Returns `self` when it is not empty.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<String> for Errors {
    fn from(message: String) -> Self {
        Self(vec![message])
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("\n"))
    }
}

impl std::error::Error for Errors {}
