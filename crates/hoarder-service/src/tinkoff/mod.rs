//! Bank ingestion job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hoarder_api::auth::CredentialManager;
use hoarder_api::tinkoff::{Session, TinkoffApi};
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::model::tinkoff::user::User;
use hoarder_db::store::BankStore;
use tracing::Instrument;

use crate::error::JobError;
use crate::firefly::Mirror;
use crate::job::Job;
use crate::pipeline;

pub mod convert;
pub mod loader;

pub const JOB_ID: &str = "tinkoff";

/// One bank login of a user.
pub struct TinkoffPhone {
    pub phone: String,
    pub client: Arc<dyn TinkoffApi>,
    /// Session manager behind `client`; used to authorize before any loader runs.
    pub credentials: Option<Arc<CredentialManager<Session>>>,
}

#[derive(Debug, Clone)]
pub struct TinkoffSettings {
    pub batch_size: i64,
    pub overlap: Duration,
    pub with_receipts: bool,
}

/// How one phone's run ended.
enum PhoneOutcome {
    Done(Errors),
    Unauthorized(Errors),
}

pub struct TinkoffJob {
    users: BTreeMap<String, Vec<TinkoffPhone>>,
    store: Arc<dyn BankStore>,
    mirror: Option<Arc<Mirror>>,
    settings: TinkoffSettings,
}

impl TinkoffJob {
    #[must_use]
    pub fn new(
        users: BTreeMap<String, Vec<TinkoffPhone>>,
        store: Arc<dyn BankStore>,
        mirror: Option<Arc<Mirror>>,
        settings: TinkoffSettings,
    ) -> Self {
        Self {
            users,
            store,
            mirror,
            settings,
        }
    }

    async fn run_phone(&self, ctx: &Ctx, now: DateTime<Utc>, phone: &TinkoffPhone) -> PhoneOutcome {
        let mut errors = Errors::new();

        let user = User {
            phone: phone.phone.clone(),
            name: None,
        };
        if let Err(err) = self.store.upsert_user(&user).await {
            ctx.error(&mut errors, err, "save user");
            return PhoneOutcome::Done(errors);
        }

        if let Some(credentials) = &phone.credentials {
            match credentials.get(ctx).await {
                Ok(_session) => {}
                Err(err) if err.is_cancelled() => return PhoneOutcome::Done(errors),
                Err(err) => {
                    ctx.error(&mut errors, err, "authorize");
                    return PhoneOutcome::Unauthorized(errors);
                }
            }
        }

        let scope = Arc::new(loader::Scope {
            phone: phone.phone.clone(),
            now,
            batch_size: self.settings.batch_size,
            overlap: self.settings.overlap,
            with_receipts: self.settings.with_receipts,
        });
        errors.extend(
            pipeline::run(
                ctx,
                phone.client.as_ref(),
                self.store.as_ref(),
                loader::roots(&scope),
            )
            .await,
        );

        if let Some(mirror) = &self.mirror
            && !ctx.is_cancelled()
        {
            errors.extend(mirror.run(ctx, &phone.phone).await);
        }
        PhoneOutcome::Done(errors)
    }
}

#[async_trait]
impl Job for TinkoffJob {
    fn id(&self) -> &str {
        JOB_ID
    }

    fn info(&self) -> &str {
        "Load bank accounts, operations, receipts and brokerage data"
    }

    async fn run(&self, ctx: &Ctx, now: DateTime<Utc>, user_id: &str) -> Result<(), JobError> {
        let Some(phones) = self.users.get(user_id) else {
            tracing::debug!(user = user_id, "No bank phones configured");
            return Ok(());
        };

        let runs = phones.iter().map(|phone| {
            let ctx = ctx.with("phone", &phone.phone);
            let span = ctx.span();
            async move { self.run_phone(&ctx, now, phone).await }.instrument(span)
        });

        let mut failed = Errors::new();
        let mut unauthorized = Errors::new();
        for outcome in join_all(runs).await {
            match outcome {
                PhoneOutcome::Done(errors) => failed.extend(errors),
                PhoneOutcome::Unauthorized(errors) => unauthorized.extend(errors),
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
