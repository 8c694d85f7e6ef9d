use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::BankStore;

use super::{BankLoaded, Scope};
use crate::pipeline::{Loaded, Loader, check};
use crate::tinkoff::convert;

pub struct ClientOffersLoader {
    scope: Arc<Scope>,
}

impl ClientOffersLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for ClientOffersLoader {
    fn table_name(&self) -> &'static str {
        "client_offers"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let mut errors = Errors::new();
        let loaded = client.client_offers(ctx).await;
        if let Some(offers) = check(ctx, &mut errors, loaded, "load client offers") {
            let batch = convert::client_offers(&self.scope.phone, &offers);
            check(ctx, &mut errors, store.replace_client_offers(&batch).await, "save client offers");
        }
        Loaded::errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use hoarder_api::tinkoff::MockTinkoffApi;
    use hoarder_db::error::DbError;
    use hoarder_db::store::MockBankStore;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_save_failure_is_reported() {
        let mut client = MockTinkoffApi::new();
        client.expect_client_offers().returning(|_| Ok(Vec::new()));
        let mut store = MockBankStore::new();
        store
            .expect_replace_client_offers()
            .returning(|_| Err(DbError::InvalidValue("offer".to_owned())));

        let scope = Arc::new(Scope {
            phone: "+7000".to_owned(),
            now: Utc::now(),
            batch_size: 10,
            overlap: Duration::ZERO,
            with_receipts: false,
        });
        let loaded = ClientOffersLoader::new(scope)
            .load(&Ctx::background(), &client, &store)
            .await;

        assert_eq!(loaded.errors.iter().collect::<Vec<_>>(), [
            "save client offers: Invalid value: offer"
        ]);
    }
}
