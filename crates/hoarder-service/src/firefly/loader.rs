use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::firefly::{
    AccountRole, AccountUpdate, CreditCardType, FireflyApi, NewAccount, NewCurrency,
};
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::db::enums::AccountType;
use hoarder_db::model::tinkoff::account::Account;
use hoarder_db::store::MirrorStore;

use super::transaction::{self, PassLinks, Plan};
use super::{MirrorLoaded, MirrorLoader};
use crate::pipeline::{Loaded, Loader, check};

/// Creates spending categories that have no downstream counterpart yet.
pub struct CategoriesLoader;

#[async_trait]
impl Loader<dyn FireflyApi, dyn MirrorStore> for CategoriesLoader {
    fn table_name(&self) -> &'static str {
        "spending_categories"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn FireflyApi, store: &dyn MirrorStore) -> MirrorLoaded {
        let mut errors = Errors::new();
        let loaded = store.unmirrored_categories().await;
        let Some(categories) = check(ctx, &mut errors, loaded, "load categories") else {
            return Loaded::errors(errors);
        };

        for category in categories {
            if ctx.is_cancelled() {
                break;
            }
            let ctx = ctx.with("category", &category.id);
            let created = client.create_category(&ctx, &category.name).await;
            let Some(firefly_id) = check(&ctx, &mut errors, created, "create category") else {
                continue;
            };
            let linked = store.set_category_firefly_id(&category.id, &firefly_id).await;
            check(&ctx, &mut errors, linked, "link category");
        }
        Loaded::errors(errors)
    }
}

/// Enables or creates the currencies the bank data uses.
pub struct CurrenciesLoader;

#[async_trait]
impl Loader<dyn FireflyApi, dyn MirrorStore> for CurrenciesLoader {
    fn table_name(&self) -> &'static str {
        "currencies"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn FireflyApi, store: &dyn MirrorStore) -> MirrorLoaded {
        let mut errors = Errors::new();
        let loaded = store.unmirrored_currencies().await;
        let Some(currencies) = check(ctx, &mut errors, loaded, "load currencies") else {
            return Loaded::errors(errors);
        };

        for currency in currencies {
            if ctx.is_cancelled() {
                break;
            }
            let ctx = ctx.with("currency", &currency.name);
            let found = client.find_currency(&ctx, &currency.name).await;
            let Some(found) = check(&ctx, &mut errors, found, "find currency") else {
                continue;
            };

            let firefly_id = match found {
                Some(existing) if existing.enabled => Some(existing.id),
                Some(existing) => {
                    let enabled = client.enable_currency(&ctx, &existing.code).await;
                    check(&ctx, &mut errors, enabled, "enable currency").map(|()| existing.id)
                }
                None => {
                    let created = client
                        .create_currency(&ctx, &NewCurrency {
                            code: currency.name.clone(),
                            name: currency.name.clone(),
                            symbol: currency.name.clone(),
                            decimal_places: 2,
                            enabled: true,
                        })
                        .await;
                    check(&ctx, &mut errors, created, "create currency")
                }
            };
            if let Some(firefly_id) = firefly_id {
                let linked = store.set_currency_firefly_id(currency.code, &firefly_id).await;
                check(&ctx, &mut errors, linked, "link currency");
            }
        }
        Loaded::errors(errors)
    }
}

/// Creates or updates the user's accounts as asset accounts, then emits the transactions pass.
pub struct AccountsLoader {
    phone: Arc<str>,
}

impl AccountsLoader {
    #[must_use]
    pub fn new(phone: Arc<str>) -> Self {
        Self { phone }
    }
}

/// ## Summary
/// Body creating `account` downstream; credit accounts become monthly-paid credit cards.
#[must_use]
pub fn new_account(account: &Account, currency_code: Option<String>) -> NewAccount {
    let (account_role, credit_card_type, monthly_payment_date) = match account.account_type {
        AccountType::Current => (AccountRole::DefaultAsset, None, None),
        AccountType::Saving => (AccountRole::SavingAsset, None, None),
        AccountType::Credit => (
            AccountRole::CcAsset,
            Some(CreditCardType::MonthlyFull),
            account.due_date,
        ),
    };
    NewAccount {
        name: account.name.clone(),
        account_type: "asset",
        account_role,
        currency_code,
        active: !account.deleted,
        credit_card_type,
        monthly_payment_date,
        notes: None,
    }
}

impl AccountsLoader {
    async fn mirror(
        ctx: &Ctx,
        client: &dyn FireflyApi,
        store: &dyn MirrorStore,
        account: &Account,
        currencies: &HashMap<i32, String>,
        errors: &mut Errors,
    ) {
        if let Some(firefly_id) = &account.firefly_id {
            let update = AccountUpdate {
                name: account.name.clone(),
                active: !account.deleted,
            };
            let updated = client.update_account(ctx, firefly_id, &update).await;
            check(ctx, errors, updated, "update account");
            return;
        }
        if account.deleted {
            return;
        }

        let body = new_account(account, currencies.get(&account.currency_code).cloned());
        let created = client.create_account(ctx, &body).await;
        if let Some(firefly_id) = check(ctx, errors, created, "create account") {
            let linked = store.set_account_firefly_id(&account.id, &firefly_id).await;
            check(ctx, errors, linked, "link account");
        }
    }
}

#[async_trait]
impl Loader<dyn FireflyApi, dyn MirrorStore> for AccountsLoader {
    fn table_name(&self) -> &'static str {
        "accounts"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn FireflyApi, store: &dyn MirrorStore) -> MirrorLoaded {
        let mut errors = Errors::new();
        let Some(currencies) = check(ctx, &mut errors, store.currencies().await, "load currencies")
        else {
            return Loaded::errors(errors);
        };
        let currencies: HashMap<i32, String> = currencies
            .into_iter()
            .map(|currency| (currency.code, currency.name))
            .collect();

        let loaded = store.accounts(&self.phone).await;
        let Some(accounts) = check(ctx, &mut errors, loaded, "load accounts") else {
            return Loaded::errors(errors);
        };
        for account in &accounts {
            if ctx.is_cancelled() {
                break;
            }
            let ctx = ctx.with("account", &account.id);
            Self::mirror(&ctx, client, store, account, &currencies, &mut errors).await;
        }

        let transactions: MirrorLoader = Box::new(TransactionsLoader {
            phone: Arc::clone(&self.phone),
        });
        Loaded {
            children: vec![transactions],
            errors,
        }
    }
}

/// Creates one downstream transaction per candidate operation or transfer pair.
pub struct TransactionsLoader {
    phone: Arc<str>,
}

impl TransactionsLoader {
    /// Deletes and unlinks stale downstream transactions; `false` when any step failed.
    async fn unlink(
        ctx: &Ctx,
        client: &dyn FireflyApi,
        store: &dyn MirrorStore,
        stale: Vec<(String, Vec<String>)>,
        links: &mut PassLinks,
        errors: &mut Errors,
    ) -> bool {
        for (firefly_id, operation_ids) in stale {
            tracing::info!(transaction = %firefly_id, "Replacing partially linked transaction");
            let deleted = client.delete_transaction(ctx, &firefly_id).await;
            if check(ctx, errors, deleted, "delete transaction").is_none() {
                return false;
            }
            let unlinked = store.set_operation_firefly_id(&operation_ids, None).await;
            if check(ctx, errors, unlinked, "unlink operations").is_none() {
                return false;
            }
            links.record(&operation_ids, None);
        }
        true
    }
}

#[async_trait]
impl Loader<dyn FireflyApi, dyn MirrorStore> for TransactionsLoader {
    fn table_name(&self) -> &'static str {
        "operations"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn FireflyApi, store: &dyn MirrorStore) -> MirrorLoaded {
        let mut errors = Errors::new();
        let loaded = store.transfer_candidates(&self.phone).await;
        let Some(candidates) = check(ctx, &mut errors, loaded, "load transfer candidates") else {
            return Loaded::errors(errors);
        };

        let mut links = PassLinks::new();
        for mut candidate in candidates {
            if ctx.is_cancelled() {
                break;
            }
            links.refresh(&mut candidate);
            if candidate.mirrored_sides().next().is_none() {
                continue;
            }
            let Some(first) = candidate.left.as_ref().or(candidate.right.as_ref()) else {
                continue;
            };
            let ctx = ctx.with("operation", &first.operation_id);

            let stale = transaction::stale_links(&candidate);
            if !stale.is_empty() {
                if !Self::unlink(&ctx, client, store, stale, &mut links, &mut errors).await {
                    continue;
                }
                for side in candidate.left.iter_mut().chain(candidate.right.iter_mut()) {
                    side.operation_firefly_id = None;
                }
            }

            let Some(plan) = check(&ctx, &mut errors, transaction::plan(&candidate), "plan transaction")
            else {
                continue;
            };
            let Plan::Create { transaction, link } = plan else {
                continue;
            };
            let created = client.create_transaction(&ctx, &transaction).await;
            let Some(firefly_id) = check(&ctx, &mut errors, created, "create transaction") else {
                continue;
            };
            let linked = store
                .set_operation_firefly_id(&link, Some(firefly_id.clone()))
                .await;
            if check(&ctx, &mut errors, linked, "link operations").is_some() {
                links.record(&link, Some(firefly_id.as_str()));
            }
        }
        Loaded::errors(errors)
    }
}
