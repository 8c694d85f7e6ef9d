//! Authorization that needs a human: refused on schedule, completed from the console.

use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::auth::CredentialManager;
use hoarder_api::error::{ApiError, ApiResult};
use hoarder_api::tinkoff::TinkoffAuthApi;
use hoarder_app::trigger::stdin::StdinTrigger;
use hoarder_core::cache::Cache;
use hoarder_core::clock::SystemClock;
use hoarder_core::context::Ctx;
use hoarder_db::store::BankStore;
use hoarder_service::auth::ApiChallenge;
use hoarder_service::error::JobError;
use hoarder_service::job::Registry;
use hoarder_service::storage::SessionStorage;
use hoarder_service::trigger::Trigger;
use tokio::io::AsyncReadExt;

use super::helpers::*;

/// Bank sign-in that accepts the SMS code `1234`.
struct SmsBank;

#[async_trait]
impl TinkoffAuthApi for SmsBank {
    async fn new_session(&self, _ctx: &Ctx) -> ApiResult<String> {
        Ok("sid-1".to_owned())
    }

    async fn sign_up(&self, _ctx: &Ctx, _session_id: &str, phone: &str) -> ApiResult<String> {
        assert_eq!(phone, PHONE);
        Ok("ticket".to_owned())
    }

    async fn confirm(&self, _ctx: &Ctx, _session_id: &str, ticket: &str, code: &str) -> ApiResult<()> {
        assert_eq!(ticket, "ticket");
        if code == "1234" {
            Ok(())
        } else {
            Err(ApiError::Remote {
                code: "CONFIRMATION_FAILED".to_owned(),
                message: "wrong code".to_owned(),
            })
        }
    }

    async fn password(&self, _ctx: &Ctx, _session_id: &str, _password: &str) -> ApiResult<()> {
        Ok(())
    }

    async fn level_up(&self, _ctx: &Ctx, _session_id: &str) -> ApiResult<String> {
        Ok("CLIENT".to_owned())
    }

    async fn ping(&self, _ctx: &Ctx, _session_id: &str) -> ApiResult<String> {
        Ok("CLIENT".to_owned())
    }
}

/// ## Summary
/// Without a way to ask, the job reports the phone as unauthorized and the registry keeps
/// going. The next console run answers the SMS prompt, the session is cached and the data loads.
#[test_log::test(tokio::test)]
async fn test_console_completes_authorization_refused_on_schedule() {
    let bank = Bank::new(fixture("fresh_ingest.json"));
    let store: Arc<dyn BankStore> = bank.store.clone();
    let sessions = SessionStorage::new(store, PHONE.to_owned(), Arc::new(SystemClock));
    let credentials = Arc::new(CredentialManager::new(
        Cache::new(Arc::new(sessions)),
        Arc::new(ApiChallenge::new(
            Arc::new(SmsBank),
            PHONE.to_owned(),
            "secret".to_owned(),
        )),
    ));
    let job = bank.job(settings(std::time::Duration::ZERO), false, Some(credentials));
    let registry = Arc::new(Registry::new(vec![Arc::new(job)]));

    let results = registry
        .run(&Ctx::background(), now(), USER, &["tinkoff".to_owned()])
        .await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].error, Some(JobError::Unauthorized(_))));
    assert!(bank.store.session(PHONE).is_none());
    assert_eq!(bank.store.rows("operations"), 0);

    let (writer, mut reader) = tokio::io::duplex(64 * 1024);
    {
        let console = StdinTrigger::new(
            &b"alice\ntinkoff\n1234\n"[..],
            writer,
            Arc::new(SystemClock),
        );
        console
            .run(&Ctx::background(), Arc::clone(&registry))
            .await
            .expect("Console failed");
    }
    let mut output = String::new();
    reader
        .read_to_string(&mut output)
        .await
        .expect("Failed to read console output");

    assert!(output.contains(&format!("{PHONE}: Enter the SMS code from the bank: ")));
    assert!(output.contains("✔ tinkoff"), "{output}");
    let session = bank.store.session(PHONE).expect("session is cached");
    assert_eq!(session.session_id, "sid-1");
    assert_eq!(session.access_level.as_deref(), Some("CLIENT"));
    assert_eq!(bank.store.rows("operations"), 2);
}
