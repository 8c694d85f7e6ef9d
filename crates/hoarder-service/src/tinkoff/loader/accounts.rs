use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::BankStore;

use super::{BankLoaded, BankLoader, OperationsLoader, ReceiptsLoader, Scope};
use crate::pipeline::{Loaded, Loader, check};
use crate::tinkoff::convert;

pub struct AccountsLoader {
    scope: Arc<Scope>,
}

impl AccountsLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for AccountsLoader {
    fn table_name(&self) -> &'static str {
        "accounts"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let mut errors = Errors::new();
        let Some(accounts) = check(ctx, &mut errors, client.accounts(ctx).await, "load accounts")
        else {
            return Loaded::errors(errors);
        };

        let (batch, skipped) = convert::accounts(&self.scope.phone, &accounts);
        for (id, kind) in skipped {
            tracing::debug!(account = %id, kind = %kind, "Skipping account");
        }

        let saved = store.sync_accounts(&self.scope.phone, &batch).await;
        if check(ctx, &mut errors, saved, "save accounts").is_none() {
            return Loaded::errors(errors);
        }
        tracing::info!(count = batch.accounts.len(), "Accounts saved");

        let mut children: Vec<BankLoader> = Vec::new();
        for account in &batch.accounts {
            children.push(Box::new(RequisitesLoader {
                account_id: account.id.clone(),
            }));
            children.push(Box::new(StatementsLoader {
                account_id: account.id.clone(),
            }));
            children.push(Box::new(OperationsLoader::new(
                Arc::clone(&self.scope),
                account.id.clone(),
            )));
        }
        if self.scope.with_receipts {
            children.push(Box::new(ReceiptsLoader::new(Arc::clone(&self.scope))));
        }

        Loaded { children, errors }
    }
}

pub struct RequisitesLoader {
    account_id: String,
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for RequisitesLoader {
    fn table_name(&self) -> &'static str {
        "account_requisites"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let ctx = ctx.with("account", &self.account_id);
        let mut errors = Errors::new();

        let loaded = client.account_requisites(&ctx, &self.account_id).await;
        if let Some(requisites) = check(&ctx, &mut errors, loaded, "load requisites") {
            let row = convert::requisites(&self.account_id, requisites);
            check(&ctx, &mut errors, store.upsert_requisites(&row).await, "save requisites");
        }
        Loaded::errors(errors)
    }
}

pub struct StatementsLoader {
    account_id: String,
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for StatementsLoader {
    fn table_name(&self) -> &'static str {
        "statements"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let ctx = ctx.with("account", &self.account_id);
        let mut errors = Errors::new();

        let loaded = client.statements(&ctx, &self.account_id).await;
        let Some(statements) = check(&ctx, &mut errors, loaded, "load statements") else {
            return Loaded::errors(errors);
        };

        let rows: Vec<_> = statements
            .iter()
            .filter_map(|statement| {
                check(
                    &ctx,
                    &mut errors,
                    convert::statement(&self.account_id, statement),
                    "convert statement",
                )
            })
            .collect();
        check(&ctx, &mut errors, store.upsert_statements(&rows).await, "save statements");
        Loaded::errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use hoarder_api::error::ApiError;
    use hoarder_api::tinkoff::MockTinkoffApi;
    use hoarder_api::tinkoff::model::Account;
    use hoarder_db::store::MockBankStore;
    use serde_json::json;

    use super::*;

    fn scope(with_receipts: bool) -> Arc<Scope> {
        Arc::new(Scope {
            phone: "+7000".to_owned(),
            now: Utc::now(),
            batch_size: 10,
            overlap: Duration::ZERO,
            with_receipts,
        })
    }

    fn accounts() -> Vec<Account> {
        serde_json::from_value(json!([
            {"id": "A", "name": "Black", "accountType": "Current",
             "currency": {"code": 643, "name": "RUB", "strCode": "643"}},
            {"id": "T", "name": "Telecom", "accountType": "Telecom",
             "currency": {"code": 643, "name": "RUB", "strCode": "643"}}
        ]))
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_accounts_emit_per_account_loaders_then_receipts() {
        let mut client = MockTinkoffApi::new();
        client.expect_accounts().returning(|_| Ok(accounts()));
        let mut store = MockBankStore::new();
        store
            .expect_sync_accounts()
            .withf(|phone, batch| phone == "+7000" && batch.accounts.len() == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let loaded = AccountsLoader::new(scope(true))
            .load(&Ctx::background(), &client, &store)
            .await;

        assert!(loaded.errors.is_empty());
        let tables: Vec<_> = loaded.children.iter().map(|l| l.table_name()).collect();
        assert_eq!(tables, [
            "account_requisites",
            "statements",
            "operations",
            "receipts"
        ]);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_listing_emits_nothing() {
        let mut client = MockTinkoffApi::new();
        client
            .expect_accounts()
            .returning(|_| Err(ApiError::Status {
                status: 500,
                body: "oops".to_owned(),
            }));
        let mut store = MockBankStore::new();
        store.expect_sync_accounts().never();

        let loaded = AccountsLoader::new(scope(true))
            .load(&Ctx::background().with("entity", "accounts"), &client, &store)
            .await;

        assert!(loaded.children.is_empty());
        assert_eq!(loaded.errors.iter().collect::<Vec<_>>(), [
            "entity=accounts: load accounts: Unexpected status 500: oops"
        ]);
    }

    #[test_log::test(tokio::test)]
    async fn test_statements_with_bad_period_are_skipped() {
        let mut client = MockTinkoffApi::new();
        client.expect_statements().returning(|_, _| {
            Ok(serde_json::from_value(json!([
                {"id": "s1", "period": {"start": {"milliseconds": 0}, "end": {"milliseconds": 1000}}},
                {"id": "s2", "period": {"start": {"milliseconds": i64::MAX}, "end": {"milliseconds": 0}}}
            ]))
            .unwrap())
        });
        let mut store = MockBankStore::new();
        store
            .expect_upsert_statements()
            .withf(|rows| rows.len() == 1 && rows[0].id == "s1")
            .times(1)
            .returning(|_| Ok(()));

        let loaded = StatementsLoader {
            account_id: "A".to_owned(),
        }
        .load(&Ctx::background(), &client, &store)
        .await;

        assert_eq!(loaded.errors.len(), 1);
    }
}
