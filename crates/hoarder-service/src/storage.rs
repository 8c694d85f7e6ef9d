//! Credential persistence backed by the relational stores.

use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::lkdr::model::Tokens;
use hoarder_api::tinkoff::Session;
use hoarder_core::cache::Storage;
use hoarder_core::clock::Clock;
use hoarder_core::context::Ctx;
use hoarder_core::error::{CoreError, CoreResult};
use hoarder_db::error::DbError;
use hoarder_db::model::lkdr;
use hoarder_db::model::tinkoff::user;
use hoarder_db::store::{BankStore, FiscalStore};

fn storage_error(err: DbError) -> CoreError {
    match err {
        DbError::CoreError(err) => err,
        err => CoreError::StorageError(err.to_string()),
    }
}

/// Bank session of one phone.
pub struct SessionStorage {
    store: Arc<dyn BankStore>,
    phone: String,
    clock: Arc<dyn Clock>,
}

impl SessionStorage {
    #[must_use]
    pub fn new(store: Arc<dyn BankStore>, phone: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            phone,
            clock,
        }
    }
}

#[async_trait]
impl Storage<Session> for SessionStorage {
    async fn load(&self, _ctx: &Ctx) -> CoreResult<Option<Session>> {
        let session = self
            .store
            .load_session(&self.phone)
            .await
            .map_err(storage_error)?;
        Ok(session.map(|row| Session {
            id: row.session_id,
            access_level: row.access_level,
        }))
    }

    async fn store(&self, _ctx: &Ctx, value: Option<&Session>) -> CoreResult<()> {
        let row = value.map(|session| user::Session {
            phone: self.phone.clone(),
            session_id: session.id.clone(),
            access_level: session.access_level.clone(),
            updated_at: self.clock.now(),
        });
        self.store
            .store_session(&self.phone, row)
            .await
            .map_err(storage_error)
    }
}

/// Fiscal service tokens of one phone.
pub struct TokenStorage {
    store: Arc<dyn FiscalStore>,
    phone: String,
}

impl TokenStorage {
    #[must_use]
    pub fn new(store: Arc<dyn FiscalStore>, phone: String) -> Self {
        Self { store, phone }
    }
}

#[async_trait]
impl Storage<Tokens> for TokenStorage {
    async fn load(&self, _ctx: &Ctx) -> CoreResult<Option<Tokens>> {
        let tokens = self
            .store
            .load_tokens(&self.phone)
            .await
            .map_err(storage_error)?;
        Ok(tokens.map(|row| Tokens {
            token: row.token,
            token_expire_in: row.token_expire_in,
            refresh_token: row.refresh_token,
            refresh_token_expires_in: row.refresh_token_expires_in,
        }))
    }

    async fn store(&self, _ctx: &Ctx, value: Option<&Tokens>) -> CoreResult<()> {
        let row = value.map(|tokens| lkdr::Tokens {
            phone: self.phone.clone(),
            token: tokens.token.clone(),
            token_expire_in: tokens.token_expire_in,
            refresh_token: tokens.refresh_token.clone(),
            refresh_token_expires_in: tokens.refresh_token_expires_in,
        });
        self.store
            .store_tokens(&self.phone, row)
            .await
            .map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use hoarder_core::clock::FixedClock;
    use hoarder_db::store::{MockBankStore, MockFiscalStore};
    use mockall::predicate::eq;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_session_round_trips_through_store() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut store = MockBankStore::new();
        store
            .expect_store_session()
            .withf(move |phone, session| {
                phone == "+7000"
                    && session.as_ref().is_some_and(|s| {
                        s.session_id == "abc" && s.access_level.as_deref() == Some("CLIENT")
                            && s.updated_at == now
                    })
            })
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_load_session()
            .with(eq("+7000"))
            .returning(move |_| {
                Ok(Some(user::Session {
                    phone: "+7000".to_owned(),
                    session_id: "abc".to_owned(),
                    access_level: None,
                    updated_at: now,
                }))
            });

        let storage = SessionStorage::new(Arc::new(store), "+7000".to_owned(), Arc::new(FixedClock(now)));
        let ctx = Ctx::background();
        storage
            .store(&ctx, Some(&Session {
                id: "abc".to_owned(),
                access_level: Some("CLIENT".to_owned()),
            }))
            .await
            .unwrap();
        let loaded = storage.load(&ctx).await.unwrap();

        assert_eq!(loaded, Some(Session {
            id: "abc".to_owned(),
            access_level: None,
        }));
    }

    #[test_log::test(tokio::test)]
    async fn test_clearing_tokens_stores_none() {
        let mut store = MockFiscalStore::new();
        store
            .expect_store_tokens()
            .withf(|phone, tokens| phone == "+7000" && tokens.is_none())
            .times(1)
            .returning(|_, _| Ok(()));

        let storage = TokenStorage::new(Arc::new(store), "+7000".to_owned());

        storage.store(&Ctx::background(), None).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_database_failure_becomes_storage_error() {
        let mut store = MockFiscalStore::new();
        store
            .expect_load_tokens()
            .returning(|_| Err(DbError::InvalidValue("broken".to_owned())));

        let storage = TokenStorage::new(Arc::new(store), "+7000".to_owned());
        let err = storage.load(&Ctx::background()).await.unwrap_err();

        assert!(matches!(err, CoreError::StorageError(msg) if msg.contains("broken")));
    }
}
