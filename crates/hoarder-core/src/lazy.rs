//! Single-flight lazy values.

use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::context::Ctx;
use crate::error::CoreError;

type InitFn<T, E> = Box<dyn Fn(Ctx) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A value computed on first use and shared afterwards.
///
/// Concurrent first callers wait for the same computation. A failed computation is not
/// memoized; the next caller retries.
pub struct Lazy<T, E = CoreError> {
    cell: OnceCell<T>,
    init: Option<InitFn<T, E>>,
}

impl<T, E> Lazy<T, E>
where
    T: Send + Sync,
    E: From<CoreError>,
{
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn(Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Some(Box::new(move |ctx| Box::pin(init(ctx)))),
        }
    }

    /// ## Summary
    /// Wraps an already computed value.
    pub fn ready(value: T) -> Self {
        Self {
            cell: OnceCell::from(value),
            init: None,
        }
    }

    /// ## Summary
    /// Returns the value, computing it if this is the first use.
    ///
    /// ## Errors
    /// Returns the initializer's error, or a cancellation error if `ctx` is cancelled.
    pub async fn get(&self, ctx: &Ctx) -> Result<&T, E> {
        self.cell
            .get_or_try_init(|| async {
                let init = self
                    .init
                    .as_ref()
                    .ok_or(CoreError::InvariantViolation("lazy value has no initializer"))?;
                ctx.run(init(ctx.clone())).await.map_err(E::from)?
            })
            .await
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_computes_once_for_concurrent_callers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: Arc<Lazy<usize>> = Arc::new(Lazy::new(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(counter.fetch_add(1, Ordering::SeqCst) + 41)
            }
        }));

        let ctx = Ctx::background();
        let (a, b) = tokio::join!(lazy.get(&ctx), lazy.get(&ctx));
        assert_eq!(a.copied(), Ok(41));
        assert_eq!(b.copied(), Ok(41));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_failure_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: Lazy<&'static str> = Lazy::new(move |_ctx| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(CoreError::StorageError("unavailable".to_owned()))
                } else {
                    Ok("ready")
                }
            }
        });

        let ctx = Ctx::background();
        assert!(lazy.get(&ctx).await.is_err());
        assert_eq!(lazy.get(&ctx).await.copied(), Ok("ready"));
        assert!(lazy.is_initialized());
    }

    #[test_log::test(tokio::test)]
    async fn test_ready_value_skips_init() {
        let lazy: Lazy<u8> = Lazy::ready(7);
        assert_eq!(lazy.get(&Ctx::background()).await.copied(), Ok(7));
    }
}
