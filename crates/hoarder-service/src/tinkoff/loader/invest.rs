use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_core::convert::non_blank;
use hoarder_db::store::BankStore;

use super::{BankLoaded, BankLoader, Scope};
use crate::pipeline::{Loaded, Loader, check, paginate};
use crate::tinkoff::convert;

pub struct InvestAccountsLoader {
    scope: Arc<Scope>,
}

impl InvestAccountsLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for InvestAccountsLoader {
    fn table_name(&self) -> &'static str {
        "invest_accounts"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let mut errors = Errors::new();
        let loaded = client.invest_accounts(ctx).await;
        let Some(accounts) = check(ctx, &mut errors, loaded, "load invest accounts") else {
            return Loaded::errors(errors);
        };

        let rows: Vec<_> = accounts
            .accounts
            .iter()
            .map(|account| convert::invest_account(&self.scope.phone, account))
            .collect();
        let saved = store.sync_invest_accounts(&self.scope.phone, &rows).await;
        if check(ctx, &mut errors, saved, "save invest accounts").is_none() {
            return Loaded::errors(errors);
        }

        let children = rows
            .into_iter()
            .map(|row| -> BankLoader {
                Box::new(InvestOperationsLoader {
                    scope: Arc::clone(&self.scope),
                    account_id: row.id,
                })
            })
            .collect();
        Loaded { children, errors }
    }
}

/// Pages through brokerage operations by cursor, from shortly before the latest stored one.
pub struct InvestOperationsLoader {
    scope: Arc<Scope>,
    account_id: String,
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for InvestOperationsLoader {
    fn table_name(&self) -> &'static str {
        "invest_operations"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let ctx = ctx.with("account", &self.account_id);
        let mut errors = Errors::new();

        let start = store
            .invest_operations_start_cursor(&self.account_id, self.scope.overlap)
            .await;
        let Some(start) = check(&ctx, &mut errors, start, "load start cursor") else {
            return Loaded::errors(errors);
        };

        let ctx = &ctx;
        let account_id = self.account_id.as_str();
        let start = start.unwrap_or_default();
        let errors = paginate(ctx, start, self.scope.batch_size, |cursor, limit| async move {
            let mut errors = Errors::new();
            let loaded = client
                .invest_operations(ctx, account_id, non_blank(Some(cursor.clone())), limit)
                .await;
            let Some(page) = check(ctx, &mut errors, loaded, "load invest operations") else {
                return Err(errors);
            };

            let records: Vec<_> = page
                .items
                .iter()
                .map(|operation| convert::invest_operation(account_id, operation))
                .collect();
            let saved = store.upsert_invest_operations(&records).await;
            if check(ctx, &mut errors, saved, "save invest operations").is_none() {
                return Err(errors);
            }

            let next = non_blank(page.next_cursor).filter(|next| page.has_next && *next != cursor);
            Ok(next)
        })
        .await;

        Loaded::errors(errors)
    }
}

/// Operation type dictionary of the brokerage, one row per type.
pub struct InvestOperationTypesLoader {
    scope: Arc<Scope>,
}

impl InvestOperationTypesLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for InvestOperationTypesLoader {
    fn table_name(&self) -> &'static str {
        "invest_operation_types"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let mut errors = Errors::new();
        let loaded = client.invest_operation_types(ctx).await;
        if let Some(types) = check(ctx, &mut errors, loaded, "load invest operation types") {
            let rows = convert::invest_operation_types(&self.scope.phone, &types.operations_types);
            let saved = store
                .sync_invest_operation_types(&self.scope.phone, &rows)
                .await;
            check(ctx, &mut errors, saved, "save invest operation types");
        }
        Loaded::errors(errors)
    }
}
