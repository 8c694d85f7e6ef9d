//! Fiscal receipts ingestion job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hoarder_api::auth::CredentialManager;
use hoarder_api::lkdr::LkdrApi;
use hoarder_api::lkdr::model::Tokens;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::FiscalStore;
use tracing::Instrument;

use crate::error::JobError;
use crate::job::Job;
use crate::pipeline;

pub mod convert;
pub mod loader;

pub const JOB_ID: &str = "lkdr";

/// One fiscal service login of a user.
pub struct LkdrPhone {
    pub phone: String,
    pub client: Arc<dyn LkdrApi>,
    pub credentials: Option<Arc<CredentialManager<Tokens>>>,
}

#[derive(Debug, Clone)]
pub struct LkdrSettings {
    pub batch_size: i64,
    pub overlap: Duration,
}

pub struct LkdrJob {
    users: BTreeMap<String, Vec<LkdrPhone>>,
    store: Arc<dyn FiscalStore>,
    settings: LkdrSettings,
}

impl LkdrJob {
    #[must_use]
    pub fn new(
        users: BTreeMap<String, Vec<LkdrPhone>>,
        store: Arc<dyn FiscalStore>,
        settings: LkdrSettings,
    ) -> Self {
        Self {
            users,
            store,
            settings,
        }
    }

    /// Returns the failures of the phone and whether it could not be authorized.
    async fn run_phone(&self, ctx: &Ctx, phone: &LkdrPhone) -> (Errors, bool) {
        let mut errors = Errors::new();

        if let Err(err) = self.store.upsert_user(&phone.phone).await {
            ctx.error(&mut errors, err, "save user");
            return (errors, false);
        }

        if let Some(credentials) = &phone.credentials {
            match credentials.get(ctx).await {
                Ok(_tokens) => {}
                Err(err) if err.is_cancelled() => return (errors, false),
                Err(err) => {
                    ctx.error(&mut errors, err, "authorize");
                    return (errors, true);
                }
            }
        }

        let scope = Arc::new(loader::Scope {
            phone: phone.phone.clone(),
            batch_size: self.settings.batch_size,
            overlap: self.settings.overlap,
        });
        let roots: Vec<loader::FiscalLoader> = vec![Box::new(loader::ReceiptsLoader::new(scope))];
        errors.extend(pipeline::run(ctx, phone.client.as_ref(), self.store.as_ref(), roots).await);
        (errors, false)
    }
}

#[async_trait]
impl Job for LkdrJob {
    fn id(&self) -> &str {
        JOB_ID
    }

    fn info(&self) -> &str {
        "Load fiscal receipts from the tax service"
    }

    async fn run(&self, ctx: &Ctx, _now: DateTime<Utc>, user_id: &str) -> Result<(), JobError> {
        let Some(phones) = self.users.get(user_id) else {
            tracing::debug!(user = user_id, "No fiscal phones configured");
            return Ok(());
        };

        let runs = phones.iter().map(|phone| {
            let ctx = ctx.with("phone", &phone.phone);
            let span = ctx.span();
            async move { self.run_phone(&ctx, phone).await }.instrument(span)
        });

        let mut failed = Errors::new();
        let mut unauthorized = Errors::new();
        for (errors, denied) in join_all(runs).await {
            if denied {
                unauthorized.extend(errors);
            } else {
                failed.extend(errors);
            }
        }

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        if !unauthorized.is_empty() {
            unauthorized.extend(failed);
            return Err(JobError::Unauthorized(unauthorized));
        }
        failed.into_result().map_err(JobError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use hoarder_api::lkdr::MockLkdrApi;
    use hoarder_api::lkdr::model::Receipts;
    use hoarder_db::store::MockFiscalStore;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_empty_account_completes() {
        let mut store = MockFiscalStore::new();
        store
            .expect_upsert_user()
            .withf(|phone| phone == "+7000")
            .returning(|_| Ok(()));
        store.expect_latest_receive_date().returning(|_| Ok(None));
        store.expect_upsert_receipts().returning(|_, _| Ok(()));
        store
            .expect_receipts_without_fiscal_data()
            .returning(|_, _, _| Ok(Vec::new()));

        let mut client = MockLkdrApi::new();
        client.expect_receipts().returning(|_, _, _, _| {
            Ok(Receipts {
                brands: Vec::new(),
                receipts: Vec::new(),
                has_more: false,
            })
        });

        let job = LkdrJob::new(
            BTreeMap::from([("alice".to_owned(), vec![LkdrPhone {
                phone: "+7000".to_owned(),
                client: Arc::new(client),
                credentials: None,
            }])]),
            Arc::new(store),
            LkdrSettings {
                batch_size: 100,
                overlap: Duration::ZERO,
            },
        );

        job.run(&Ctx::background(), Utc::now(), "alice")
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_cancelled_run_reports_cancellation() {
        let mut store = MockFiscalStore::new();
        store.expect_upsert_user().returning(|_| Ok(()));

        let job = LkdrJob::new(
            BTreeMap::from([("alice".to_owned(), vec![LkdrPhone {
                phone: "+7000".to_owned(),
                client: Arc::new(MockLkdrApi::new()),
                credentials: None,
            }])]),
            Arc::new(store),
            LkdrSettings {
                batch_size: 100,
                overlap: Duration::ZERO,
            },
        );
        let ctx = Ctx::background();
        ctx.cancellation().cancel();

        let err = job.run(&ctx, Utc::now(), "alice").await.unwrap_err();

        assert!(matches!(err, JobError::Cancelled));
    }
}
