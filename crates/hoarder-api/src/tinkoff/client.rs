//! Authenticated bank client with rate limiting, retries and session re-authorization.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoarder_core::context::Ctx;
use hoarder_core::lock::{Limiter, Limiters, Semaphore};
use serde::de::DeserializeOwned;

use super::model::{
    Account, ClientOffer, InvestAccounts, InvestOperationTypes, InvestOperations, Operation,
    Requisites, ShoppingReceipt, Statement,
};
use super::transport::Transport;
use super::{ACCESS_LEVEL_CLIENT, Session, TinkoffApi, TinkoffAuthApi};
use crate::auth::CredentialManager;
use crate::error::{ApiError, ApiResult};
use crate::http;

const PATH_ACCOUNTS: &str = "accounts_light_ib";
const PATH_REQUISITES: &str = "account_requisites";
const PATH_STATEMENTS: &str = "statements";
const PATH_OPERATIONS: &str = "operations";
const PATH_SHOPPING_RECEIPT: &str = "shopping_receipt";
const PATH_CLIENT_OFFERS: &str = "client_offers";
const PATH_INVEST_ACCOUNTS: &str = "invest-portfolio/portfolios/accounts";
const PATH_INVEST_OPERATIONS: &str = "ca-operations/api/v1/user/operations";
const PATH_INVEST_OPERATION_TYPES: &str = "ca-operations/api/v1/operations/types";

pub struct HttpTinkoffClient {
    transport: Arc<Transport>,
    credentials: Arc<CredentialManager<Session>>,
    limiters: HashMap<&'static str, Arc<dyn Limiter>>,
    retry_attempts: u32,
}

impl HttpTinkoffClient {
    #[must_use]
    pub fn new(
        transport: Arc<Transport>,
        credentials: Arc<CredentialManager<Session>>,
        retry_attempts: u32,
    ) -> Self {
        let receipts: Arc<dyn Limiter> = Arc::new(Limiters::new(vec![
            Arc::new(Semaphore::new(25, Duration::from_secs(75))),
            Arc::new(Semaphore::new(75, Duration::from_secs(11 * 60))),
        ]));

        Self {
            transport,
            credentials,
            limiters: HashMap::from([(PATH_SHOPPING_RECEIPT, receipts)]),
            retry_attempts,
        }
    }

    /// ## Summary
    /// Runs `call` with the current session, retrying rate-limited calls with backoff and
    /// re-authorizing once when the session lacks privileges.
    async fn with_session<T, F, Fut>(&self, ctx: &Ctx, path: &'static str, call: F) -> ApiResult<T>
    where
        F: Fn(Session) -> Fut + Send + Sync,
        Fut: Future<Output = ApiResult<T>> + Send,
    {
        let mut attempt = 0;
        let mut reauthorized = false;
        loop {
            if let Some(limiter) = self.limiters.get(path) {
                limiter.acquire(ctx).await?;
            }

            let session = self.credentials.get(ctx).await?;
            match call(session.clone()).await {
                Err(ApiError::RateLimitExceeded) if attempt < self.retry_attempts => {
                    attempt += 1;
                    let delay = http::backoff(attempt);
                    tracing::warn!(path, attempt, ?delay, "Rate limit exceeded, backing off");
                    ctx.sleep(delay).await?;
                }
                Err(ApiError::InsufficientPrivileges) if !reauthorized => {
                    reauthorized = true;
                    tracing::warn!(path, "Insufficient privileges, re-authorizing");
                    self.credentials.invalidate(ctx, &session).await?;
                }
                result => return result,
            }
        }
    }

    async fn call<T: DeserializeOwned + Send>(
        &self,
        ctx: &Ctx,
        path: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> ApiResult<T> {
        let params = &params;
        self.with_session(ctx, path, |session| async move {
            self.transport
                .call(ctx, path, Some(&session.id), params)
                .await?
                .into_payload()
        })
        .await
    }

    async fn call_plain<T: DeserializeOwned + Send>(
        &self,
        ctx: &Ctx,
        path: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> ApiResult<T> {
        let params = &params;
        self.with_session(ctx, path, |session| async move {
            self.transport
                .call_plain(ctx, path, &session.id, params)
                .await
        })
        .await
    }

    /// ## Summary
    /// Checks the stored session every `interval` and invalidates it once its access level
    /// drops below client. Returns when the context is cancelled.
    pub async fn ping_loop(&self, ctx: &Ctx, interval: Duration) {
        while ctx.sleep(interval).await.is_ok() {
            match self.ping(ctx).await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => return,
                Err(err) => tracing::warn!(error = %err, "Session check failed"),
            }
        }
        tracing::debug!("Session check stopped");
    }

    async fn ping(&self, ctx: &Ctx) -> ApiResult<()> {
        let Some(session) = self.credentials.cached(ctx).await? else {
            return Ok(());
        };

        let level = match self.transport.ping(ctx, &session.id).await {
            Ok(level) => level,
            Err(ApiError::InsufficientPrivileges) => String::new(),
            Err(err) => return Err(err),
        };
        if level != ACCESS_LEVEL_CLIENT {
            tracing::warn!(access_level = %level, "Session dropped below client level");
            self.credentials.invalidate(ctx, &session).await?;
        }
        Ok(())
    }
}

fn millis(value: DateTime<Utc>) -> String {
    value.timestamp_millis().to_string()
}

#[async_trait]
impl TinkoffApi for HttpTinkoffClient {
    async fn accounts(&self, ctx: &Ctx) -> ApiResult<Vec<Account>> {
        self.call(ctx, PATH_ACCOUNTS, Vec::new()).await
    }

    async fn account_requisites(&self, ctx: &Ctx, account_id: &str) -> ApiResult<Requisites> {
        self.call(ctx, PATH_REQUISITES, vec![("account", account_id.to_owned())])
            .await
    }

    async fn statements(&self, ctx: &Ctx, account_id: &str) -> ApiResult<Vec<Statement>> {
        self.call(ctx, PATH_STATEMENTS, vec![("account", account_id.to_owned())])
            .await
    }

    async fn operations(
        &self,
        ctx: &Ctx,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Vec<Operation>> {
        self.call(ctx, PATH_OPERATIONS, vec![
            ("account", account_id.to_owned()),
            ("start", millis(start)),
            ("end", millis(end)),
        ])
        .await
    }

    async fn shopping_receipt(&self, ctx: &Ctx, operation_id: &str) -> ApiResult<ShoppingReceipt> {
        self.call(ctx, PATH_SHOPPING_RECEIPT, vec![(
            "operationId",
            operation_id.to_owned(),
        )])
        .await
    }

    async fn invest_accounts(&self, ctx: &Ctx) -> ApiResult<InvestAccounts> {
        self.call_plain(ctx, PATH_INVEST_ACCOUNTS, Vec::new()).await
    }

    async fn invest_operations(
        &self,
        ctx: &Ctx,
        broker_account_id: &str,
        cursor: Option<String>,
        limit: i64,
    ) -> ApiResult<InvestOperations> {
        let mut params = vec![
            ("brokerAccountId", broker_account_id.to_owned()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        self.call_plain(ctx, PATH_INVEST_OPERATIONS, params).await
    }

    async fn invest_operation_types(&self, ctx: &Ctx) -> ApiResult<InvestOperationTypes> {
        self.call_plain(ctx, PATH_INVEST_OPERATION_TYPES, Vec::new())
            .await
    }

    async fn client_offers(&self, ctx: &Ctx) -> ApiResult<Vec<ClientOffer>> {
        self.call(ctx, PATH_CLIENT_OFFERS, Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hoarder_core::cache::{Cache, Storage};
    use hoarder_core::error::CoreResult;

    use super::*;
    use crate::auth::Authorize;
    use crate::tinkoff::Device;

    #[derive(Default)]
    struct Memory(Mutex<Option<Session>>);

    #[async_trait]
    impl Storage<Session> for Memory {
        async fn load(&self, _ctx: &Ctx) -> CoreResult<Option<Session>> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn store(&self, _ctx: &Ctx, value: Option<&Session>) -> CoreResult<()> {
            *self.0.lock().unwrap() = value.cloned();
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sequence(AtomicUsize);

    #[async_trait]
    impl Authorize<Session> for Sequence {
        async fn authorize(&self, _ctx: &Ctx, _previous: Option<Session>) -> ApiResult<Session> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Session {
                id: format!("s{n}"),
                access_level: Some(ACCESS_LEVEL_CLIENT.to_owned()),
            })
        }
    }

    fn client(retry_attempts: u32) -> (HttpTinkoffClient, Arc<Sequence>) {
        let authorizer = Arc::new(Sequence::default());
        let credentials = Arc::new(CredentialManager::new(
            Cache::new(Arc::new(Memory::default())),
            Arc::clone(&authorizer) as Arc<dyn Authorize<Session>>,
        ));
        let transport = Arc::new(Transport::new(
            reqwest::Client::new(),
            "http://localhost",
            "http://localhost",
            Device::web("device".to_owned()),
        ));
        (
            HttpTinkoffClient::new(transport, credentials, retry_attempts),
            authorizer,
        )
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn rate_limited_call_is_retried() {
        let (client, _) = client(3);
        let calls = AtomicUsize::new(0);

        let result = client
            .with_session(&Ctx::background(), PATH_OPERATIONS, |_session| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::RateLimitExceeded)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn retries_are_capped() {
        let (client, _) = client(2);
        let calls = AtomicUsize::new(0);

        let result: ApiResult<()> = client
            .with_session(&Ctx::background(), PATH_OPERATIONS, |_session| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::RateLimitExceeded) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::RateLimitExceeded)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test_log::test(tokio::test)]
    async fn insufficient_privileges_reauthorizes_once() {
        let (client, authorizer) = client(0);
        let sessions = Mutex::new(Vec::new());

        let result: ApiResult<()> = client
            .with_session(&Ctx::background(), PATH_OPERATIONS, |session| {
                sessions.lock().unwrap().push(session.id);
                async { Err(ApiError::InsufficientPrivileges) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::InsufficientPrivileges)));
        assert_eq!(*sessions.lock().unwrap(), ["s1", "s2"]);
        assert_eq!(authorizer.0.load(Ordering::SeqCst), 2);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn cancellation_interrupts_backoff() {
        let (client, _) = client(5);
        let ctx = Ctx::background();
        ctx.cancellation().cancel();

        let result: ApiResult<()> = client
            .with_session(&ctx, PATH_OPERATIONS, |_session| async {
                Err(ApiError::RateLimitExceeded)
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
