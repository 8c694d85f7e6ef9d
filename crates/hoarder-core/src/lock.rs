//! Context-aware locks.
//!
//! [`Mutex`] and [`RwMutex`] record the acquired level in the returned [`Ctx`]. Re-acquiring
//! the same or a lower level with a context that already holds the lock is a no-op, so helpers
//! may re-enter their caller's critical section. [`Semaphore`] admits at most `size`
//! acquisitions per `interval` and [`KeyedMutex`] provides exclusivity per key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

use crate::context::Ctx;
use crate::error::{CoreError, CoreResult};

const READ: u8 = 1;
const WRITE: u8 = 2;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

fn next_lock_id() -> u64 {
    NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Holds an acquired lock until dropped. Re-entrant acquisitions hold nothing.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Default)]
pub struct Guard {
    _mutex: Option<OwnedMutexGuard<()>>,
    _read: Option<OwnedRwLockReadGuard<()>>,
    _write: Option<OwnedRwLockWriteGuard<()>>,
    // Declared last: runs after the lock above is released.
    _release: Release,
}

/// Cleanup run once the guard's lock is released.
#[derive(Default)]
struct Release(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl Guard {
    fn reentered() -> Self {
        Self::default()
    }
}

/// Exclusive lock, reentrant relative to the context.
pub struct Mutex {
    id: u64,
    inner: Arc<tokio::sync::Mutex<()>>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_lock_id(),
            inner: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// ## Summary
    /// Acquires the lock and returns a context that records holding it.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] if the context is cancelled while waiting.
    pub async fn lock(&self, ctx: &Ctx) -> CoreResult<(Ctx, Guard)> {
        if ctx.held_level(self.id).is_some() {
            return Ok((ctx.clone(), Guard::reentered()));
        }

        let guard = ctx.run(Arc::clone(&self.inner).lock_owned()).await?;
        Ok((
            ctx.holding(self.id, WRITE),
            Guard {
                _mutex: Some(guard),
                ..Guard::default()
            },
        ))
    }
}

/// Read/write lock, reentrant relative to the context.
pub struct RwMutex {
    id: u64,
    inner: Arc<tokio::sync::RwLock<()>>,
}

impl Default for RwMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RwMutex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_lock_id(),
            inner: Arc::new(tokio::sync::RwLock::new(())),
        }
    }

    /// ## Summary
    /// Acquires shared access. A context holding either level re-enters.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] if the context is cancelled while waiting.
    pub async fn read(&self, ctx: &Ctx) -> CoreResult<(Ctx, Guard)> {
        if ctx.held_level(self.id).is_some_and(|level| level >= READ) {
            return Ok((ctx.clone(), Guard::reentered()));
        }

        let guard = ctx.run(Arc::clone(&self.inner).read_owned()).await?;
        Ok((
            ctx.holding(self.id, READ),
            Guard {
                _read: Some(guard),
                ..Guard::default()
            },
        ))
    }

    /// ## Summary
    /// Acquires exclusive access. A context holding the write level re-enters.
    ///
    /// ## Errors
    /// Returns [`CoreError::LockUpgrade`] if the context holds only the read level, or
    /// [`CoreError::Cancelled`] if the context is cancelled while waiting.
    pub async fn write(&self, ctx: &Ctx) -> CoreResult<(Ctx, Guard)> {
        match ctx.held_level(self.id) {
            Some(WRITE) => return Ok((ctx.clone(), Guard::reentered())),
            Some(_) => return Err(CoreError::LockUpgrade),
            None => {}
        }

        let guard = ctx.run(Arc::clone(&self.inner).write_owned()).await?;
        Ok((
            ctx.holding(self.id, WRITE),
            Guard {
                _write: Some(guard),
                ..Guard::default()
            },
        ))
    }
}

/// Admission control shared by all calls of one kind (e.g. one API path).
pub trait Limiter: Send + Sync {
    /// ## Summary
    /// Waits until the caller is admitted.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] if the context is cancelled while waiting.
    fn acquire<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, CoreResult<()>>;
}

/// Semaphore admitting at most `size` acquisitions within any `interval`.
///
/// Each admission holds its permit for `interval` after it was granted; callers do not
/// release anything themselves.
pub struct Semaphore {
    permits: Arc<tokio::sync::Semaphore>,
    interval: Duration,
}

impl Semaphore {
    #[must_use]
    pub fn new(size: usize, interval: Duration) -> Self {
        Self {
            permits: Arc::new(tokio::sync::Semaphore::new(size)),
            interval,
        }
    }
}

impl Limiter for Semaphore {
    fn acquire<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, CoreResult<()>> {
        Box::pin(async move {
            let permit = ctx
                .run(Arc::clone(&self.permits).acquire_owned())
                .await?
                .map_err(|_closed| CoreError::InvariantViolation("semaphore closed"))?;

            let interval = self.interval;
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                drop(permit);
            });

            Ok(())
        })
    }
}

/// Acquires every inner limiter in order.
pub struct Limiters(Vec<Arc<dyn Limiter>>);

impl Limiters {
    #[must_use]
    pub fn new(limiters: Vec<Arc<dyn Limiter>>) -> Self {
        Self(limiters)
    }
}

impl Limiter for Limiters {
    fn acquire<'a>(&'a self, ctx: &'a Ctx) -> BoxFuture<'a, CoreResult<()>> {
        Box::pin(async move {
            for limiter in &self.0 {
                limiter.acquire(ctx).await?;
            }
            Ok(())
        })
    }
}

type KeyedLocks<K> = Arc<std::sync::Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>;

/// Exclusive locks keyed by an arbitrary value (e.g. user id). A key's entry lives only while
/// someone holds or waits for it.
pub struct KeyedMutex<K> {
    locks: KeyedLocks<K>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops the entry for `key` unless another holder or waiter still shares it.
fn forget_idle<K: Eq + Hash>(locks: &KeyedLocks<K>, key: &K) {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        locks.remove(key);
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> KeyedMutex<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::default(),
        }
    }

    fn entry(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn guard(&self, key: &K, guard: OwnedMutexGuard<()>) -> Guard {
        let locks = Arc::clone(&self.locks);
        let key = key.clone();
        Guard {
            _mutex: Some(guard),
            _release: Release(Some(Box::new(move || forget_idle(&locks, &key)))),
            ..Guard::default()
        }
    }

    /// ## Summary
    /// Acquires the lock for `key` without waiting; `None` if someone else holds it.
    pub fn try_lock(&self, key: &K) -> Option<Guard> {
        let acquired = self.entry(key).try_lock_owned().ok();
        acquired.map(|guard| self.guard(key, guard))
    }

    /// ## Summary
    /// Waits for the lock for `key`.
    ///
    /// ## Errors
    /// Returns [`CoreError::Cancelled`] if the context is cancelled while waiting.
    pub async fn lock(&self, ctx: &Ctx, key: &K) -> CoreResult<Guard> {
        match ctx.run(self.entry(key).lock_owned()).await {
            Ok(guard) => Ok(self.guard(key, guard)),
            Err(err) => {
                forget_idle(&self.locks, key);
                Err(err)
            }
        }
    }

    /// Number of keys currently held or waited for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_mutex_reenters_on_holding_context() {
        let mutex = Mutex::new();
        let ctx = Ctx::background();

        let (held, _guard) = mutex.lock(&ctx).await.unwrap();
        let reentered = tokio::time::timeout(Duration::from_millis(100), mutex.lock(&held)).await;
        assert!(matches!(reentered, Ok(Ok(_))));

        let blocked = tokio::time::timeout(Duration::from_millis(50), mutex.lock(&ctx)).await;
        assert!(blocked.is_err(), "a fresh context must wait for the holder");
    }

    #[test_log::test(tokio::test)]
    async fn test_rw_mutex_levels() {
        let lock = RwMutex::new();
        let ctx = Ctx::background();

        let (writer, _guard) = lock.write(&ctx).await.unwrap();
        assert!(lock.read(&writer).await.is_ok());
        assert!(lock.write(&writer).await.is_ok());

        let other = RwMutex::new();
        let (reader, _read_guard) = other.read(&ctx).await.unwrap();
        assert!(matches!(other.write(&reader).await, Err(CoreError::LockUpgrade)));
    }

    #[test_log::test(tokio::test)]
    async fn test_lock_wait_honors_cancellation() {
        let lock = RwMutex::new();
        let root = Ctx::background();
        let (_writer, _guard) = lock.write(&root).await.unwrap();

        let (waiter, cancel) = root.child();
        cancel.cancel();
        assert!(matches!(lock.read(&waiter).await, Err(CoreError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_semaphore_admits_size_per_interval() {
        let semaphore = Semaphore::new(2, Duration::from_secs(10));
        let ctx = Ctx::background();

        semaphore.acquire(&ctx).await.unwrap();
        semaphore.acquire(&ctx).await.unwrap();

        let third = tokio::time::timeout(Duration::from_secs(5), semaphore.acquire(&ctx)).await;
        assert!(third.is_err(), "third admission must wait for the window");

        let third = tokio::time::timeout(Duration::from_secs(10), semaphore.acquire(&ctx)).await;
        assert!(matches!(third, Ok(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiters_apply_strictest_window() {
        let limiters = Limiters::new(vec![
            Arc::new(Semaphore::new(3, Duration::from_secs(1))),
            Arc::new(Semaphore::new(1, Duration::from_secs(60))),
        ]);
        let ctx = Ctx::background();

        limiters.acquire(&ctx).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(30), limiters.acquire(&ctx)).await;
        assert!(second.is_err());
    }

    #[test]
    fn test_keyed_mutex_is_exclusive_per_key() {
        let locks = KeyedMutex::<String>::new();

        let alice = locks.try_lock(&"alice".to_owned());
        assert!(alice.is_some());
        assert!(locks.try_lock(&"alice".to_owned()).is_none());
        assert!(locks.try_lock(&"bob".to_owned()).is_some());

        drop(alice);
        assert!(locks.try_lock(&"alice".to_owned()).is_some());
    }

    #[test_log::test(tokio::test)]
    async fn test_keyed_mutex_forgets_released_keys() {
        let locks = Arc::new(KeyedMutex::<String>::new());
        let ctx = Ctx::background();

        let held = locks.lock(&ctx, &"alice".to_owned()).await.unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let ctx = Ctx::background();
                locks.lock(&ctx, &"alice".to_owned()).await.map(drop)
            })
        };
        tokio::task::yield_now().await;
        drop(held);
        waiter.await.unwrap().unwrap();
        assert!(locks.is_empty());

        let cancelled = Ctx::background();
        let bob = locks.try_lock(&"bob".to_owned()).unwrap();
        cancelled.cancellation().cancel();
        assert!(matches!(
            locks.lock(&cancelled, &"bob".to_owned()).await,
            Err(CoreError::Cancelled)
        ));
        assert_eq!(locks.len(), 1);
        drop(bob);
        assert!(locks.is_empty());
    }
}
