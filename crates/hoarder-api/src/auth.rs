//! Credential lifecycle shared by the authenticated clients.
//!
//! A [`CredentialManager`] fronts the persisted credential of one phone with a write-through
//! [`Cache`] and serializes re-authorization through a context-reentrant [`RwMutex`]: readers
//! take the cached value, a missing value is produced by the [`Authorize`] strategy under the
//! write lock.

use std::sync::Arc;

use async_trait::async_trait;
use hoarder_core::cache::Cache;
use hoarder_core::context::Ctx;
use hoarder_core::lock::RwMutex;

use crate::error::ApiResult;

/// Strategy that obtains a fresh credential, possibly asking the user for a confirmation code.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Authorize<T: Send + Sync + 'static>: Send + Sync {
    /// ## Summary
    /// Produces a new credential. `previous` is the credential being replaced, if any.
    ///
    /// ## Errors
    /// Returns an error when the flow fails or the context cannot prompt for a code.
    async fn authorize(&self, ctx: &Ctx, previous: Option<T>) -> ApiResult<T>;
}

pub struct CredentialManager<T> {
    cache: Cache<T>,
    lock: RwMutex,
    authorizer: Arc<dyn Authorize<T>>,
}

impl<T> CredentialManager<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(cache: Cache<T>, authorizer: Arc<dyn Authorize<T>>) -> Self {
        Self {
            cache,
            lock: RwMutex::new(),
            authorizer,
        }
    }

    /// ## Summary
    /// Returns the current credential, authorizing first when none is stored.
    ///
    /// ## Errors
    /// Returns storage errors and errors of the authorization strategy.
    pub async fn get(&self, ctx: &Ctx) -> ApiResult<T> {
        {
            let (read_ctx, _guard) = self.lock.read(ctx).await?;
            if let Some(credential) = self.cache.get(&read_ctx).await? {
                return Ok(credential);
            }
        }

        let (write_ctx, _guard) = self.lock.write(ctx).await?;
        if let Some(credential) = self.cache.get(&write_ctx).await? {
            return Ok(credential);
        }

        tracing::info!("Authorizing");
        let credential = self.authorizer.authorize(&write_ctx, None).await?;
        self.cache
            .update(&write_ctx, Some(credential.clone()))
            .await?;
        Ok(credential)
    }

    /// ## Summary
    /// Returns the stored credential without authorizing.
    ///
    /// ## Errors
    /// Returns storage errors.
    pub async fn cached(&self, ctx: &Ctx) -> ApiResult<Option<T>> {
        let (read_ctx, _guard) = self.lock.read(ctx).await?;
        Ok(self.cache.get(&read_ctx).await?)
    }

    /// ## Summary
    /// Forgets `stale` so the next [`CredentialManager::get`] re-authorizes. A credential
    /// that was already replaced by a concurrent caller is kept.
    ///
    /// ## Errors
    /// Returns storage errors.
    pub async fn invalidate(&self, ctx: &Ctx, stale: &T) -> ApiResult<()> {
        let (write_ctx, _guard) = self.lock.write(ctx).await?;
        if self.cache.get(&write_ctx).await?.as_ref() == Some(stale) {
            tracing::info!("Credential invalidated");
            self.cache.update(&write_ctx, None).await?;
        }
        Ok(())
    }

    /// ## Summary
    /// Replaces the stored credential through the strategy, passing the current one along.
    ///
    /// ## Errors
    /// Returns storage errors and errors of the authorization strategy.
    pub async fn refresh(&self, ctx: &Ctx) -> ApiResult<T> {
        let (write_ctx, _guard) = self.lock.write(ctx).await?;
        let previous = self.cache.get(&write_ctx).await?;
        let credential = self.authorizer.authorize(&write_ctx, previous).await?;
        self.cache
            .update(&write_ctx, Some(credential.clone()))
            .await?;
        Ok(credential)
    }
}
