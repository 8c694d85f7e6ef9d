//! Builds the clients, stores, jobs and triggers described by the settings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hoarder_api::auth::{Authorize, CredentialManager};
use hoarder_api::captcha::{CaptchaSolver, RuCaptcha};
use hoarder_api::firefly::HttpFireflyClient;
use hoarder_api::http::build_client;
use hoarder_api::lkdr::model::Tokens;
use hoarder_api::lkdr::{HttpLkdrClient, LkdrTransport};
use hoarder_api::telegram::HttpTelegramClient;
use hoarder_api::tinkoff::{Device, HttpTinkoffClient, Session, Transport};
use hoarder_api::webdriver::{BrowserFactory, WebDriver};
use hoarder_core::cache::Cache;
use hoarder_core::clock::{Clock, SystemClock};
use hoarder_core::config::{
    LkdrConfig, LkdrCredentials, Settings, TinkoffAuth, TinkoffConfig, TinkoffCredentials,
};
use hoarder_core::context::Ctx;
use hoarder_db::db::connection::create_pool;
use hoarder_db::db::migrations::{Family, run_migrations};
use hoarder_db::db::query::PgStore;
use hoarder_db::store::{BankStore, FiscalStore};
use hoarder_service::auth::{ApiChallenge, BrowserLogin, BrowserLoginSettings, LkdrLogin};
use hoarder_service::firefly::Mirror;
use hoarder_service::job::{Job, Registry};
use hoarder_service::lkdr::{LkdrJob, LkdrPhone, LkdrSettings};
use hoarder_service::storage::{SessionStorage, TokenStorage};
use hoarder_service::tinkoff::{TinkoffJob, TinkoffPhone, TinkoffSettings};
use hoarder_service::trigger::{Trigger, Triggers};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::trigger::schedule::ScheduleTrigger;
use crate::trigger::stdin::StdinTrigger;
use crate::trigger::telegram::TelegramTrigger;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const LKDR_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Everything `main` runs until shutdown.
pub struct App {
    pub registry: Arc<Registry>,
    pub triggers: Triggers,
    /// Session keep-alive loops; they stop with the root context.
    pub background: Vec<JoinHandle<()>>,
}

/// Shared services the per-phone wiring draws from.
struct Shared {
    clock: Arc<dyn Clock>,
    captcha: Option<Arc<dyn CaptchaSolver>>,
    browsers: Option<(Arc<dyn BrowserFactory>, Duration)>,
}

/// ## Summary
/// Migrates the databases and assembles jobs and triggers from `settings`.
///
/// ## Errors
/// Returns an error for inconsistent settings or when a database cannot be migrated or
/// connected.
pub async fn build(ctx: &Ctx, settings: &Settings) -> anyhow::Result<App> {
    let shared = Shared {
        clock: Arc::new(SystemClock),
        captcha: settings
            .captcha
            .as_ref()
            .map(|captcha| -> anyhow::Result<Arc<dyn CaptchaSolver>> {
                Ok(Arc::new(RuCaptcha::new(
                    build_client(None, HTTP_TIMEOUT)?,
                    &captcha.api_url,
                    captcha.key.clone(),
                    captcha.poll_interval,
                    captcha.timeout,
                )))
            })
            .transpose()?,
        browsers: settings
            .selenium
            .as_ref()
            .map(|selenium| -> anyhow::Result<(Arc<dyn BrowserFactory>, Duration)> {
                let driver = WebDriver::new(
                    build_client(None, selenium.timeout)?,
                    &selenium.url,
                    selenium.browser,
                    selenium.binary.clone(),
                    selenium.args.clone(),
                );
                Ok((Arc::new(driver), selenium.timeout))
            })
            .transpose()?,
    };

    let mut jobs: Vec<Arc<dyn Job>> = Vec::new();
    let mut background = Vec::new();

    if let Some(config) = &settings.tinkoff {
        let store = connect(&config.database.url, config.database.max_connections, Family::Tinkoff)
            .await
            .context("tinkoff database")?;
        let mirror = match &settings.firefly {
            Some(firefly) => {
                let api = HttpFireflyClient::new(
                    build_client(None, HTTP_TIMEOUT)?,
                    &firefly.server_url,
                    firefly.access_token.clone(),
                );
                Some(Arc::new(Mirror::new(Arc::new(api), store.clone())))
            }
            None => None,
        };

        let mut users = BTreeMap::new();
        for (user, logins) in &config.users {
            let phones = logins
                .iter()
                .map(|login| tinkoff_phone(ctx, &shared, config, login, &store, &mut background))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("tinkoff user {user}"))?;
            users.insert(user.clone(), phones);
        }

        let settings = TinkoffSettings {
            batch_size: i64::try_from(config.batch_size).context("tinkoff.batch_size")?,
            overlap: config.overlap,
            with_receipts: config.with_receipts,
        };
        jobs.push(Arc::new(TinkoffJob::new(users, store, mirror, settings)));
    } else if settings.firefly.is_some() {
        tracing::warn!("Firefly is configured without tinkoff; nothing will be mirrored");
    }

    if let Some(config) = &settings.lkdr {
        let store = connect(&config.database.url, config.database.max_connections, Family::Lkdr)
            .await
            .context("lkdr database")?;

        let mut users = BTreeMap::new();
        for (user, logins) in &config.users {
            let phones = logins
                .iter()
                .map(|login| lkdr_phone(&shared, config, login, &store))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("lkdr user {user}"))?;
            users.insert(user.clone(), phones);
        }

        let settings = LkdrSettings {
            batch_size: i64::try_from(config.batch_size).context("lkdr.batch_size")?,
            overlap: config.overlap,
        };
        jobs.push(Arc::new(LkdrJob::new(users, store, settings)));
    }

    let triggers = triggers(settings, &shared.clock)?;
    if triggers.is_empty() {
        anyhow::bail!("No triggers configured; enable schedule, stdin or telegram");
    }

    Ok(App {
        registry: Arc::new(Registry::new(jobs)),
        triggers: Triggers::new(triggers),
        background,
    })
}

async fn connect(url: &str, max_connections: u8, family: Family) -> anyhow::Result<Arc<PgStore>> {
    run_migrations(url, family).await?;
    let pool = create_pool(url, u32::from(max_connections)).await?;
    tracing::info!(?family, "Database connection pool created");
    Ok(Arc::new(PgStore::new(pool)))
}

fn tinkoff_phone(
    ctx: &Ctx,
    shared: &Shared,
    config: &TinkoffConfig,
    login: &TinkoffCredentials,
    store: &Arc<PgStore>,
    background: &mut Vec<JoinHandle<()>>,
) -> anyhow::Result<TinkoffPhone> {
    let device_id = login
        .device_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let transport = Arc::new(Transport::new(
        build_client(login.user_agent.as_deref(), HTTP_TIMEOUT)?,
        &config.api_url,
        &config.invest_url,
        Device::web(device_id),
    ));

    let authorizer: Arc<dyn Authorize<Session>> = match config.auth {
        TinkoffAuth::Api => Arc::new(ApiChallenge::new(
            transport.clone(),
            login.phone.clone(),
            login.password.clone(),
        )),
        TinkoffAuth::Browser => {
            let (browsers, timeout) = shared
                .browsers
                .clone()
                .context("selenium must be configured for browser authorization")?;
            Arc::new(BrowserLogin::new(
                browsers,
                login.phone.clone(),
                login.password.clone(),
                BrowserLoginSettings {
                    login_url: config.login_url.clone(),
                    user_agent: login.user_agent.clone(),
                    timeout,
                },
            ))
        }
    };

    let bank: Arc<dyn BankStore> = store.clone();
    let sessions = SessionStorage::new(bank, login.phone.clone(), Arc::clone(&shared.clock));
    let credentials = Arc::new(CredentialManager::new(
        Cache::new(Arc::new(sessions)),
        authorizer,
    ));
    let client = Arc::new(HttpTinkoffClient::new(
        transport,
        Arc::clone(&credentials),
        config.retry_attempts,
    ));

    let ping_ctx = ctx.with("phone", &login.phone);
    let span = ping_ctx.span();
    let pinger = Arc::clone(&client);
    let interval = config.ping_interval;
    background.push(tokio::spawn(
        async move { pinger.ping_loop(&ping_ctx, interval).await }.instrument(span),
    ));

    Ok(TinkoffPhone {
        phone: login.phone.clone(),
        client,
        credentials: Some(credentials),
    })
}

fn lkdr_phone(
    shared: &Shared,
    config: &LkdrConfig,
    login: &LkdrCredentials,
    store: &Arc<PgStore>,
) -> anyhow::Result<LkdrPhone> {
    let site_key = config
        .captcha_site_key
        .clone()
        .context("lkdr.captcha_site_key must be set when lkdr users are configured")?;
    let captcha = shared
        .captcha
        .clone()
        .context("captcha must be configured when lkdr users are configured")?;

    let device_id = login
        .device_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_agent = login
        .user_agent
        .clone()
        .unwrap_or_else(|| LKDR_USER_AGENT.to_owned());
    let transport = Arc::new(LkdrTransport::new(
        build_client(Some(&user_agent), HTTP_TIMEOUT)?,
        &config.api_url,
        device_id,
        user_agent,
    ));

    let authorizer: Arc<dyn Authorize<Tokens>> = Arc::new(LkdrLogin::new(
        transport.clone(),
        captcha,
        site_key,
        config.captcha_page_url.clone(),
        login.phone.clone(),
        Arc::clone(&shared.clock),
    ));
    let fiscal: Arc<dyn FiscalStore> = store.clone();
    let credentials = Arc::new(CredentialManager::new(
        Cache::new(Arc::new(TokenStorage::new(fiscal, login.phone.clone()))),
        authorizer,
    ));

    Ok(LkdrPhone {
        phone: login.phone.clone(),
        client: Arc::new(HttpLkdrClient::new(
            transport,
            Arc::clone(&credentials),
            Arc::clone(&shared.clock),
        )),
        credentials: Some(credentials),
    })
}

fn triggers(settings: &Settings, clock: &Arc<dyn Clock>) -> anyhow::Result<Vec<Arc<dyn Trigger>>> {
    let mut triggers: Vec<Arc<dyn Trigger>> = Vec::new();

    if let Some(schedule) = &settings.schedule {
        triggers.push(Arc::new(ScheduleTrigger::new(
            schedule.interval,
            schedule.users.clone(),
            Arc::clone(clock),
        )));
    }

    if settings.stdin {
        triggers.push(Arc::new(StdinTrigger::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            Arc::clone(clock),
        )));
    }

    if let Some(telegram) = &settings.telegram {
        let users = telegram
            .users
            .iter()
            .map(|(sender, user)| {
                let sender = sender
                    .parse::<i64>()
                    .with_context(|| format!("telegram sender id {sender:?}"))?;
                Ok((sender, user.clone()))
            })
            .collect::<anyhow::Result<HashMap<_, _>>>()?;
        let http = build_client(None, telegram.poll_timeout + HTTP_TIMEOUT)?;
        triggers.push(Arc::new(TelegramTrigger::new(
            Arc::new(HttpTelegramClient::new(http, &telegram.api_url, &telegram.token)),
            users,
            telegram.poll_timeout,
            telegram.typing_interval,
            Arc::clone(clock),
        )));
    }

    Ok(triggers)
}
