//! Write-through cache for a single persisted value (sessions, tokens).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::context::Ctx;
use crate::error::CoreResult;

/// Persistent backing of a [`Cache`].
#[async_trait]
pub trait Storage<T>: Send + Sync {
    /// ## Summary
    /// Loads the persisted value; `None` when nothing is stored.
    ///
    /// ## Errors
    /// Returns a storage error if the backend fails.
    async fn load(&self, ctx: &Ctx) -> CoreResult<Option<T>>;

    /// ## Summary
    /// Persists `value`; `None` clears the stored value.
    ///
    /// ## Errors
    /// Returns a storage error if the backend fails.
    async fn store(&self, ctx: &Ctx, value: Option<&T>) -> CoreResult<()>;
}

/// In-memory value loaded on first [`Cache::get`] and written through on [`Cache::update`].
///
/// Absence is memoized too: after the first load only an explicit update changes the value.
pub struct Cache<T> {
    storage: Arc<dyn Storage<T>>,
    value: RwLock<Option<Option<T>>>,
}

impl<T: Clone + Send + Sync> Cache<T> {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage<T>>) -> Self {
        Self {
            storage,
            value: RwLock::new(None),
        }
    }

    /// ## Summary
    /// Returns the cached value, loading it from storage on first use.
    ///
    /// ## Errors
    /// Returns the storage error, or a cancellation error.
    pub async fn get(&self, ctx: &Ctx) -> CoreResult<Option<T>> {
        if let Some(value) = ctx.run(self.value.read()).await?.as_ref() {
            return Ok(value.clone());
        }

        let mut slot = ctx.run(self.value.write()).await?;
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }

        let loaded = ctx.run(self.storage.load(ctx)).await??;
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// ## Summary
    /// Writes `value` through to storage and, on success, replaces the cached value.
    ///
    /// ## Errors
    /// Returns the storage error, or a cancellation error. The cached value is unchanged then.
    pub async fn update(&self, ctx: &Ctx, value: Option<T>) -> CoreResult<()> {
        let mut slot = ctx.run(self.value.write()).await?;
        ctx.run(self.storage.store(ctx, value.as_ref())).await??;
        *slot = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::CoreError;

    #[derive(Default)]
    struct Recorded {
        value: Mutex<Option<String>>,
        loads: AtomicUsize,
        fail_store: bool,
    }

    #[async_trait]
    impl Storage<String> for Recorded {
        async fn load(&self, _ctx: &Ctx) -> CoreResult<Option<String>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.lock().map_err(|_poisoned| CoreError::InvariantViolation("poisoned"))?.clone())
        }

        async fn store(&self, _ctx: &Ctx, value: Option<&String>) -> CoreResult<()> {
            if self.fail_store {
                return Err(CoreError::StorageError("read-only".to_owned()));
            }
            *self.value.lock().map_err(|_poisoned| CoreError::InvariantViolation("poisoned"))? = value.cloned();
            Ok(())
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_absent_value_is_memoized() {
        let storage = Arc::new(Recorded::default());
        let cache = Cache::new(Arc::clone(&storage) as Arc<dyn Storage<String>>);
        let ctx = Ctx::background();

        assert_eq!(cache.get(&ctx).await, Ok(None));
        *storage.value.lock().unwrap() = Some("sneaky".to_owned());
        assert_eq!(cache.get(&ctx).await, Ok(None));
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_update_writes_through() {
        let storage = Arc::new(Recorded::default());
        let cache = Cache::new(Arc::clone(&storage) as Arc<dyn Storage<String>>);
        let ctx = Ctx::background();

        cache.update(&ctx, Some("session".to_owned())).await.unwrap();
        assert_eq!(cache.get(&ctx).await, Ok(Some("session".to_owned())));
        assert_eq!(storage.value.lock().unwrap().as_deref(), Some("session"));
        assert_eq!(storage.loads.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_update_keeps_cached_value() {
        let storage = Arc::new(Recorded {
            value: Mutex::new(Some("old".to_owned())),
            fail_store: true,
            ..Recorded::default()
        });
        let cache = Cache::new(Arc::clone(&storage) as Arc<dyn Storage<String>>);
        let ctx = Ctx::background();

        assert!(cache.update(&ctx, Some("new".to_owned())).await.is_err());
        assert_eq!(cache.get(&ctx).await, Ok(Some("old".to_owned())));
    }
}
