//! Fiscal receipt loaders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hoarder_api::lkdr::LkdrApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::FiscalStore;

use super::convert;
use crate::pipeline::{Loaded, Loader, check, page_len, paginate, window_start};

/// Marker of a fiscal data request the service asks to repeat later.
pub const TRY_LATER: &str = "Повторите попытку позже";

pub type FiscalLoader = Box<dyn Loader<dyn LkdrApi, dyn FiscalStore>>;
pub type FiscalLoaded = Loaded<dyn LkdrApi, dyn FiscalStore>;

#[derive(Debug, Clone)]
pub struct Scope {
    pub phone: String,
    pub batch_size: i64,
    pub overlap: Duration,
}

/// Loads receipts received since the last stored one, then emits the fiscal data pass.
pub struct ReceiptsLoader {
    scope: Arc<Scope>,
}

impl ReceiptsLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Loader<dyn LkdrApi, dyn FiscalStore> for ReceiptsLoader {
    fn table_name(&self) -> &'static str {
        "receipts"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn LkdrApi, store: &dyn FiscalStore) -> FiscalLoaded {
        let mut errors = Errors::new();
        let phone = self.scope.phone.as_str();

        let checkpoint = store.latest_receive_date(phone).await;
        let Some(checkpoint) = check(ctx, &mut errors, checkpoint, "load checkpoint") else {
            return Loaded::errors(errors);
        };
        let date_from = checkpoint.map(|_| window_start(checkpoint, self.scope.overlap));
        tracing::debug!(?date_from, "Loading receipts");

        errors.extend(
            paginate(ctx, 0_i64, self.scope.batch_size, |offset, limit| async move {
                let mut errors = Errors::new();
                let loaded = client.receipts(ctx, date_from, offset, limit).await;
                let Some(page) = check(ctx, &mut errors, loaded, "load receipts") else {
                    return Err(errors);
                };

                let brands = convert::brands(&page.brands);
                let receipts: Vec<_> = page
                    .receipts
                    .iter()
                    .map(|receipt| convert::receipt(phone, receipt))
                    .collect();
                let saved = store.upsert_receipts(&brands, &receipts).await;
                if check(ctx, &mut errors, saved, "save receipts").is_none() {
                    return Err(errors);
                }

                Ok((page.has_more && !receipts.is_empty()).then(|| offset + page_len(&receipts)))
            })
            .await,
        );

        let fiscal_data: FiscalLoader = Box::new(FiscalDataLoader {
            scope: Arc::clone(&self.scope),
        });
        Loaded {
            children: vec![fiscal_data],
            errors,
        }
    }
}

/// Fills in fiscal data of stored receipts that have none yet.
pub struct FiscalDataLoader {
    scope: Arc<Scope>,
}

/// ## Summary
/// Loads and stores the fiscal data of one page of receipt keys.
///
/// Returns how many keys were skipped and so remain pending. Any other failure ends the batch.
async fn load_page(
    ctx: &Ctx,
    client: &dyn LkdrApi,
    store: &dyn FiscalStore,
    keys: &[String],
) -> Result<i64, Errors> {
    let mut errors = Errors::new();
    let mut skipped = 0;

    for key in keys {
        let ctx = ctx.with("receipt", key);
        let data = match client.fiscal_data(&ctx, key).await {
            Ok(data) => data,
            Err(err) if err.to_string().contains(TRY_LATER) => {
                tracing::warn!(receipt = %key, error = %err, "Fiscal data not ready, skipping");
                skipped += 1;
                continue;
            }
            Err(err) => {
                check::<(), _>(&ctx, &mut errors, Err(err), "load fiscal data");
                return Err(errors);
            }
        };

        let record = convert::fiscal_data(key, data);
        if check(&ctx, &mut errors, store.save_fiscal_data(&record).await, "save fiscal data")
            .is_none()
        {
            return Err(errors);
        }
    }
    Ok(skipped)
}

#[async_trait]
impl Loader<dyn LkdrApi, dyn FiscalStore> for FiscalDataLoader {
    fn table_name(&self) -> &'static str {
        "fiscal_data"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn LkdrApi, store: &dyn FiscalStore) -> FiscalLoaded {
        let phone = self.scope.phone.as_str();

        let errors = paginate(ctx, 0_i64, self.scope.batch_size, |offset, limit| async move {
            let mut errors = Errors::new();
            let pending = store.receipts_without_fiscal_data(phone, offset, limit).await;
            let Some(keys) = check(ctx, &mut errors, pending, "load pending receipts") else {
                return Err(errors);
            };

            // Saved receipts leave the pending set; skipped ones stay and are stepped over.
            let skipped = load_page(ctx, client, store, &keys).await?;
            Ok((page_len(&keys) == limit).then_some(offset + skipped))
        })
        .await;

        Loaded::errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use hoarder_api::error::ApiError;
    use hoarder_api::lkdr::MockLkdrApi;
    use hoarder_api::lkdr::model::{FiscalData, Receipts};
    use hoarder_db::store::MockFiscalStore;
    use serde_json::json;

    use super::*;

    fn scope(batch_size: i64) -> Arc<Scope> {
        Arc::new(Scope {
            phone: "+7000".to_owned(),
            batch_size,
            overlap: Duration::from_secs(24 * 3600),
        })
    }

    fn receipts(keys: &[&str], has_more: bool) -> Receipts {
        let receipts: Vec<_> = keys
            .iter()
            .map(|key| json!({"key": key, "brandId": 1, "receiveDate": "2024-03-02T10:00:00Z"}))
            .collect();
        serde_json::from_value(json!({
            "brands": [{"id": 1, "name": "Shop", "image": null}],
            "receipts": receipts,
            "hasMore": has_more
        }))
        .unwrap()
    }

    fn fiscal() -> FiscalData {
        serde_json::from_value(json!({"totalSum": 10.0, "items": []})).unwrap()
    }

    fn try_later() -> ApiError {
        ApiError::Remote {
            code: "lkdr.fiscal.error".to_owned(),
            message: TRY_LATER.to_owned(),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_receipts_resume_before_checkpoint_and_emit_fiscal_data() {
        let mut store = MockFiscalStore::new();
        store
            .expect_latest_receive_date()
            .returning(|_| Ok(Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap())));
        store
            .expect_upsert_receipts()
            .withf(|brands, receipts| brands.len() == 1 && receipts[0].user_phone == "+7000")
            .times(2)
            .returning(|_, _| Ok(()));

        let mut client = MockLkdrApi::new();
        client
            .expect_receipts()
            .withf(|_, date_from, _, limit| {
                *date_from == Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()) && *limit == 2
            })
            .times(2)
            .returning(|_, _, offset, _| match offset {
                0 => Ok(receipts(&["k1", "k2"], true)),
                _ => Ok(receipts(&["k3"], false)),
            });

        let loaded = ReceiptsLoader::new(scope(2))
            .load(&Ctx::background(), &client, &store)
            .await;

        assert!(loaded.errors.is_empty());
        assert_eq!(loaded.children.len(), 1);
        assert_eq!(loaded.children[0].table_name(), "fiscal_data");
    }

    #[test_log::test(tokio::test)]
    async fn test_first_run_loads_everything() {
        let mut store = MockFiscalStore::new();
        store.expect_latest_receive_date().returning(|_| Ok(None));
        store.expect_upsert_receipts().returning(|_, _| Ok(()));

        let mut client = MockLkdrApi::new();
        client
            .expect_receipts()
            .withf(|_, date_from, offset, _| date_from.is_none() && *offset == 0)
            .times(1)
            .returning(|_, _, _, _| Ok(receipts(&["k1"], false)));

        let loaded = ReceiptsLoader::new(scope(10))
            .load(&Ctx::background(), &client, &store)
            .await;

        assert!(loaded.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_try_later_is_skipped_silently() {
        let mut store = MockFiscalStore::new();
        let pages = AtomicUsize::new(0);
        store
            .expect_receipts_without_fiscal_data()
            .times(2)
            .returning(move |_, offset, _| {
                if pages.fetch_add(1, Ordering::SeqCst) == 0 {
                    assert_eq!(offset, 0);
                    Ok(vec!["k1".to_owned(), "k2".to_owned()])
                } else {
                    // k1 was skipped and is still pending
                    assert_eq!(offset, 1);
                    Ok(Vec::new())
                }
            });
        store
            .expect_save_fiscal_data()
            .withf(|record| record.fiscal_data.receipt_key == "k2")
            .times(1)
            .returning(|_| Ok(()));

        let mut client = MockLkdrApi::new();
        client.expect_fiscal_data().returning(|_, key| {
            if key == "k1" {
                Err(try_later())
            } else {
                Ok(fiscal())
            }
        });

        let loaded = FiscalDataLoader { scope: scope(2) }
            .load(&Ctx::background(), &client, &store)
            .await;

        assert!(loaded.errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_other_failure_ends_the_batch() {
        let mut store = MockFiscalStore::new();
        store
            .expect_receipts_without_fiscal_data()
            .times(1)
            .returning(|_, _, _| Ok(vec!["k1".to_owned(), "k2".to_owned()]));
        store.expect_save_fiscal_data().never();

        let mut client = MockLkdrApi::new();
        client.expect_fiscal_data().times(1).returning(|_, _| {
            Err(ApiError::Remote {
                code: "lkdr.receipt.not.found".to_owned(),
                message: "Чек не найден".to_owned(),
            })
        });

        let loaded = FiscalDataLoader { scope: scope(2) }
            .load(&Ctx::background(), &client, &store)
            .await;

        assert_eq!(loaded.errors.iter().collect::<Vec<_>>(), [
            "receipt=k1: load fiscal data: lkdr.receipt.not.found: Чек не найден"
        ]);
    }
}
