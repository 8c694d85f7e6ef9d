use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hoarder_api::auth::Authorize;
use hoarder_api::error::{ApiError, ApiResult};
use hoarder_api::tinkoff::Session;
use hoarder_api::webdriver::{Browser, BrowserFactory, wait_any};
use hoarder_core::context::Ctx;

use super::{ask_for_phone, require_ask_fn};

const PHONE_INPUT: &str = "//input[@automation-id='phone-input']";
const OTP_INPUT: &str = "//input[@automation-id='otp-input']";
const PASSWORD_INPUT: &str = "//input[@automation-id='password-input']";
const SKIP_BUTTON: &str = "//button[@automation-id='cancel-button']";
const REJECT_BUTTON: &str = "//button[@automation-id='rejection-button']";
const SIGNED_IN: &str = "//*[@data-qa-type='navigation/myAccount' or contains(@href, '/mybank/')]";

/// Steps in the order the selectors are polled; the index returned by `wait_any` maps here.
const SELECTORS: [&str; 6] = [
    SIGNED_IN,
    OTP_INPUT,
    PASSWORD_INPUT,
    PHONE_INPUT,
    SKIP_BUTTON,
    REJECT_BUTTON,
];

const SESSION_COOKIE: &str = "psid";
const ENTER: &str = "\u{e007}";
const MAX_STEPS: usize = 12;

pub struct BrowserLoginSettings {
    pub login_url: String,
    pub user_agent: Option<String>,
    pub timeout: Duration,
}

/// Signs in through the bank's web login form driven over WebDriver.
pub struct BrowserLogin {
    browsers: Arc<dyn BrowserFactory>,
    phone: String,
    password: String,
    settings: BrowserLoginSettings,
}

impl BrowserLogin {
    #[must_use]
    pub fn new(
        browsers: Arc<dyn BrowserFactory>,
        phone: String,
        password: String,
        settings: BrowserLoginSettings,
    ) -> Self {
        Self {
            browsers,
            phone,
            password,
            settings,
        }
    }

    async fn drive(&self, ctx: &Ctx, browser: &dyn Browser) -> ApiResult<String> {
        browser.goto(ctx, &self.settings.login_url).await?;

        for _ in 0..MAX_STEPS {
            let (step, element) = wait_any(ctx, browser, &SELECTORS, self.settings.timeout).await?;
            match SELECTORS[step] {
                SIGNED_IN => {
                    return browser.cookie(ctx, SESSION_COOKIE).await?.ok_or_else(|| {
                        ApiError::Unauthorized(format!("{SESSION_COOKIE} cookie is missing"))
                    });
                }
                OTP_INPUT => {
                    let code = ctx.ask("Enter the SMS code from the bank").await?;
                    tracing::debug!("Submitting code");
                    browser
                        .send_keys(ctx, &element, &format!("{}{ENTER}", code.trim()))
                        .await?;
                }
                PASSWORD_INPUT => {
                    tracing::debug!("Submitting password");
                    browser
                        .send_keys(ctx, &element, &format!("{}{ENTER}", self.password))
                        .await?;
                }
                PHONE_INPUT => {
                    tracing::debug!("Submitting phone");
                    browser
                        .send_keys(ctx, &element, &format!("{}{ENTER}", self.phone))
                        .await?;
                }
                _ => {
                    tracing::debug!(selector = SELECTORS[step], "Dismissing prompt");
                    browser.click(ctx, &element).await?;
                }
            }
            // Let the page replace the submitted form before polling again.
            ctx.sleep(Duration::from_secs(1)).await?;
        }

        Err(ApiError::Unauthorized(format!(
            "login did not finish in {MAX_STEPS} steps"
        )))
    }
}

#[async_trait]
impl Authorize<Session> for BrowserLogin {
    #[tracing::instrument(skip_all, fields(phone = %self.phone))]
    async fn authorize(&self, ctx: &Ctx, _previous: Option<Session>) -> ApiResult<Session> {
        require_ask_fn(ctx)?;
        let ctx = ask_for_phone(ctx, &self.phone);
        let browser = self
            .browsers
            .open(&ctx, self.settings.user_agent.clone())
            .await?;

        let result = self.drive(&ctx, browser.as_ref()).await;
        if let Err(err) = browser.close(&ctx).await {
            tracing::warn!(error = %err, "Failed to close browser");
        }

        let id = result?;
        tracing::info!("Session authorized in browser");
        Ok(Session {
            id,
            access_level: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hoarder_api::webdriver::{MockBrowser, MockBrowserFactory};
    use hoarder_core::context::ask_fn;

    use super::*;

    fn settings() -> BrowserLoginSettings {
        BrowserLoginSettings {
            login_url: "https://bank.test/login/".to_owned(),
            user_agent: Some("agent".to_owned()),
            timeout: Duration::from_secs(1),
        }
    }

    /// Browser whose page shows `pages[state]`; any input or click moves to the next page.
    fn scripted(pages: &'static [&'static str], typed: Arc<Mutex<Vec<String>>>) -> MockBrowser {
        let state = Arc::new(AtomicUsize::new(0));
        let mut browser = MockBrowser::new();
        browser
            .expect_goto()
            .withf(|_, url| url == "https://bank.test/login/")
            .returning(|_, _| Ok(()));
        let current = Arc::clone(&state);
        browser.expect_find().returning(move |_, xpath| {
            let page = pages[current.load(Ordering::SeqCst)];
            Ok((page == xpath).then(|| "element".to_owned()))
        });
        let next = Arc::clone(&state);
        browser.expect_send_keys().returning(move |_, _, text| {
            typed.lock().unwrap().push(text.to_owned());
            next.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        browser.expect_click().returning(move |_, _| {
            state.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        browser
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_walks_form_and_reads_session_cookie() {
        const PAGES: &[&str] = &[PHONE_INPUT, OTP_INPUT, PASSWORD_INPUT, SKIP_BUTTON, SIGNED_IN];
        let typed = Arc::new(Mutex::new(Vec::new()));
        let mut browser = scripted(PAGES, Arc::clone(&typed));
        browser
            .expect_cookie()
            .withf(|_, name| name == "psid")
            .returning(|_, _| Ok(Some("session-1".to_owned())));
        browser.expect_close().times(1).returning(|_| Ok(()));

        let mut factory = MockBrowserFactory::new();
        factory
            .expect_open()
            .withf(|_, agent| agent.as_deref() == Some("agent"))
            .return_once(move |_, _| Ok(Box::new(browser)));

        let ctx = Ctx::background().with_ask_fn(ask_fn(|_ctx, prompt| async move {
            assert!(prompt.starts_with("+7000: "));
            Ok("4321".to_owned())
        }));
        let login = BrowserLogin::new(
            Arc::new(factory),
            "+7000".to_owned(),
            "secret".to_owned(),
            settings(),
        );

        let session = login.authorize(&ctx, None).await.unwrap();

        assert_eq!(session.id, "session-1");
        assert_eq!(*typed.lock().unwrap(), [
            format!("+7000{ENTER}"),
            format!("4321{ENTER}"),
            format!("secret{ENTER}"),
        ]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_browser_is_closed_when_login_fails() {
        const PAGES: &[&str] = &[OTP_INPUT];
        let mut browser = scripted(PAGES, Arc::default());
        browser.expect_close().times(1).returning(|_| Ok(()));

        let mut factory = MockBrowserFactory::new();
        factory
            .expect_open()
            .return_once(move |_, _| Ok(Box::new(browser)));

        let login = BrowserLogin::new(
            Arc::new(factory),
            "+7000".to_owned(),
            "secret".to_owned(),
            settings(),
        );
        let ctx = Ctx::background().with_ask_fn(ask_fn(|_ctx, _prompt| async {
            Err(hoarder_core::error::CoreError::AskFailed("chat closed".to_owned()))
        }));
        let err = login.authorize(&ctx, None).await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Core(hoarder_core::error::CoreError::AskFailed(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_browser_is_not_opened_without_an_ask_fn() {
        let mut factory = MockBrowserFactory::new();
        factory.expect_open().never();

        let login = BrowserLogin::new(
            Arc::new(factory),
            "+7000".to_owned(),
            "secret".to_owned(),
            settings(),
        );
        let err = login
            .authorize(&Ctx::background(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::Core(hoarder_core::error::CoreError::NoAskFn)
        ));
    }
}
