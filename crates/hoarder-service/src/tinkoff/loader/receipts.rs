use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::error::ApiError;
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::BankStore;

use super::{BankLoaded, Scope};
use crate::pipeline::{Loaded, Loader, check, page_len, paginate};
use crate::tinkoff::convert;

/// Fetches shopping receipts of debited operations that announce one.
pub struct ReceiptsLoader {
    scope: Arc<Scope>,
}

impl ReceiptsLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }
}

/// ## Summary
/// Loads and stores the receipts of one page of pending operations. Any failure ends the batch.
async fn load_page(
    ctx: &Ctx,
    client: &dyn TinkoffApi,
    store: &dyn BankStore,
    operation_ids: &[String],
) -> Result<(), Errors> {
    let mut errors = Errors::new();

    for operation_id in operation_ids {
        let ctx = ctx.with("operation", operation_id);
        let stored = match client.shopping_receipt(&ctx, operation_id).await {
            Ok(receipt) => {
                let Some(record) = check(
                    &ctx,
                    &mut errors,
                    convert::receipt(operation_id, receipt),
                    "convert receipt",
                ) else {
                    return Err(errors);
                };
                check(&ctx, &mut errors, store.save_receipt(&record).await, "save receipt")
            }
            Err(ApiError::NoDataFound) => {
                tracing::debug!("No receipt, clearing flag");
                let cleared = store.clear_shopping_receipt(operation_id).await;
                check(&ctx, &mut errors, cleared, "clear receipt flag")
            }
            Err(err) => check::<(), _>(&ctx, &mut errors, Err(err), "load receipt"),
        };
        if stored.is_none() {
            return Err(errors);
        }
    }
    Ok(())
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for ReceiptsLoader {
    fn table_name(&self) -> &'static str {
        "receipts"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let phone = self.scope.phone.as_str();

        let errors = paginate(ctx, 0_i64, self.scope.batch_size, |offset, limit| async move {
            let mut errors = Errors::new();
            let pending = store.pending_receipts(phone, offset, limit).await;
            let Some(operation_ids) = check(ctx, &mut errors, pending, "load pending receipts")
            else {
                return Err(errors);
            };

            load_page(ctx, client, store, &operation_ids).await?;
            // Stored and cleared operations leave the pending set, so the offset stays put.
            Ok((page_len(&operation_ids) == limit).then_some(offset))
        })
        .await;

        Loaded::errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use hoarder_api::tinkoff::MockTinkoffApi;
    use hoarder_api::tinkoff::model::ShoppingReceipt;
    use hoarder_db::store::MockBankStore;
    use serde_json::json;

    use super::*;

    fn scope() -> Arc<Scope> {
        Arc::new(Scope {
            phone: "+7000".to_owned(),
            now: Utc::now(),
            batch_size: 2,
            overlap: Duration::ZERO,
            with_receipts: true,
        })
    }

    fn receipt() -> ShoppingReceipt {
        serde_json::from_value(json!({"receipt": {"totalSum": 10.0}})).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_receipt_clears_flag_and_pages_continue() {
        let mut store = MockBankStore::new();
        let pages = AtomicUsize::new(0);
        store
            .expect_pending_receipts()
            .withf(|phone, offset, limit| phone == "+7000" && *offset == 0 && *limit == 2)
            .times(2)
            .returning(move |_, _, _| {
                if pages.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(vec!["1".to_owned(), "2".to_owned()])
                } else {
                    Ok(vec!["3".to_owned()])
                }
            });
        store
            .expect_save_receipt()
            .times(2)
            .returning(|_| Ok(()));
        store
            .expect_clear_shopping_receipt()
            .withf(|id| id == "2")
            .times(1)
            .returning(|_| Ok(()));

        let mut client = MockTinkoffApi::new();
        client
            .expect_shopping_receipt()
            .returning(|_, id| {
                if id == "2" {
                    Err(ApiError::NoDataFound)
                } else {
                    Ok(receipt())
                }
            });

        let loaded = ReceiptsLoader::new(scope())
            .load(&Ctx::background(), &client, &store)
            .await;

        assert!(loaded.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_remote_failure_ends_the_batch() {
        let mut store = MockBankStore::new();
        store
            .expect_pending_receipts()
            .times(1)
            .returning(|_, _, _| Ok(vec!["1".to_owned(), "2".to_owned()]));
        store.expect_save_receipt().never();

        let mut client = MockTinkoffApi::new();
        client
            .expect_shopping_receipt()
            .times(1)
            .returning(|_, _| Err(ApiError::RateLimitExceeded));

        let loaded = ReceiptsLoader::new(scope())
            .load(&Ctx::background(), &client, &store)
            .await;

        assert_eq!(loaded.errors.iter().collect::<Vec<_>>(), [
            "operation=1: load receipt: rate limit exceeded"
        ]);
    }
}
