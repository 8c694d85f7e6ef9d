//! Minimal W3C WebDriver client used for browser-driven logins.

use std::time::Duration;

use async_trait::async_trait;
use hoarder_core::config::Browser as BrowserKind;
use hoarder_core::context::Ctx;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::http;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const NO_SUCH_ELEMENT: &str = "no such element";
const NO_SUCH_COOKIE: &str = "no such cookie";

/// One open browser window.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, ctx: &Ctx, url: &str) -> ApiResult<()>;

    /// Returns the id of the first element matching `xpath`, if any.
    async fn find(&self, ctx: &Ctx, xpath: &str) -> ApiResult<Option<String>>;

    async fn click(&self, ctx: &Ctx, element: &str) -> ApiResult<()>;

    async fn send_keys(&self, ctx: &Ctx, element: &str, text: &str) -> ApiResult<()>;

    async fn cookie(&self, ctx: &Ctx, name: &str) -> ApiResult<Option<String>>;

    async fn close(&self, ctx: &Ctx) -> ApiResult<()>;
}

/// Opens browser windows.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn open(&self, ctx: &Ctx, user_agent: Option<String>) -> ApiResult<Box<dyn Browser>>;
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct Failure {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSession {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct Cookie {
    value: String,
}

/// Builds the capabilities requesting `kind` with the given binary and arguments.
#[must_use]
pub fn capabilities(
    kind: BrowserKind,
    binary: Option<&str>,
    args: &[String],
    user_agent: Option<&str>,
) -> Value {
    let mut args = args.to_vec();
    let (name, options_key) = match kind {
        BrowserKind::Firefox => ("firefox", "moz:firefoxOptions"),
        BrowserKind::Chrome | BrowserKind::Chromium => ("chrome", "goog:chromeOptions"),
    };

    let mut options = json!({});
    if let Some(user_agent) = user_agent {
        match kind {
            BrowserKind::Firefox => {
                options["prefs"] = json!({ "general.useragent.override": user_agent });
            }
            BrowserKind::Chrome | BrowserKind::Chromium => {
                args.push(format!("--user-agent={user_agent}"));
            }
        }
    }
    options["args"] = json!(args);
    if let Some(binary) = binary {
        options["binary"] = json!(binary);
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": name,
                options_key: options,
            }
        }
    })
}

/// Connection to a WebDriver endpoint.
pub struct WebDriver {
    http: reqwest::Client,
    base_url: String,
    kind: BrowserKind,
    binary: Option<String>,
    args: Vec<String>,
}

impl WebDriver {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        kind: BrowserKind,
        binary: Option<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            kind,
            binary,
            args,
        }
    }
}

async fn command<T: DeserializeOwned>(
    ctx: &Ctx,
    http: &reqwest::Client,
    method: Method,
    url: String,
    body: Option<Value>,
) -> ApiResult<T> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    match http::json::<Reply<T>>(ctx, http::send(ctx, request).await?).await {
        Ok(reply) => Ok(reply.value),
        Err(ApiError::Status { status, body }) => Err(
            match serde_json::from_str::<Reply<Failure>>(&body) {
                Ok(reply) => ApiError::Remote {
                    code: reply.value.error,
                    message: reply.value.message,
                },
                Err(_err) => ApiError::Status { status, body },
            },
        ),
        Err(err) => Err(err),
    }
}

fn is_missing(err: &ApiError, kind: &str) -> bool {
    matches!(err, ApiError::Remote { code, .. } if code == kind)
}

#[async_trait]
impl BrowserFactory for WebDriver {
    #[tracing::instrument(skip(self, ctx))]
    async fn open(&self, ctx: &Ctx, user_agent: Option<String>) -> ApiResult<Box<dyn Browser>> {
        let body = capabilities(
            self.kind,
            self.binary.as_deref(),
            &self.args,
            user_agent.as_deref(),
        );
        let session: NewSession = command(
            ctx,
            &self.http,
            Method::POST,
            format!("{}/session", self.base_url),
            Some(body),
        )
        .await?;
        tracing::debug!(session_id = %session.session_id, "Browser session opened");

        Ok(Box::new(Session {
            http: self.http.clone(),
            url: format!("{}/session/{}", self.base_url, session.session_id),
        }))
    }
}

struct Session {
    http: reqwest::Client,
    url: String,
}

impl Session {
    async fn call<T: DeserializeOwned>(
        &self,
        ctx: &Ctx,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        command(ctx, &self.http, method, format!("{}{path}", self.url), body).await
    }
}

#[async_trait]
impl Browser for Session {
    async fn goto(&self, ctx: &Ctx, url: &str) -> ApiResult<()> {
        self.call::<Value>(ctx, Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find(&self, ctx: &Ctx, xpath: &str) -> ApiResult<Option<String>> {
        let found = self
            .call::<Value>(
                ctx,
                Method::POST,
                "/element",
                Some(json!({ "using": "xpath", "value": xpath })),
            )
            .await;
        match found {
            Ok(element) => Ok(element
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(str::to_owned)),
            Err(err) if is_missing(&err, NO_SUCH_ELEMENT) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn click(&self, ctx: &Ctx, element: &str) -> ApiResult<()> {
        self.call::<Value>(
            ctx,
            Method::POST,
            &format!("/element/{element}/click"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn send_keys(&self, ctx: &Ctx, element: &str, text: &str) -> ApiResult<()> {
        self.call::<Value>(
            ctx,
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn cookie(&self, ctx: &Ctx, name: &str) -> ApiResult<Option<String>> {
        match self
            .call::<Cookie>(ctx, Method::GET, &format!("/cookie/{name}"), None)
            .await
        {
            Ok(cookie) => Ok(Some(cookie.value)),
            Err(err) if is_missing(&err, NO_SUCH_COOKIE) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn close(&self, ctx: &Ctx) -> ApiResult<()> {
        self.call::<Value>(ctx, Method::DELETE, "", None).await?;
        Ok(())
    }
}

/// ## Summary
/// Polls `xpaths` until one of them is present and returns its index and element id.
///
/// ## Errors
/// Returns [`ApiError::Unauthorized`] when nothing appears within `timeout`.
pub async fn wait_any(
    ctx: &Ctx,
    browser: &dyn Browser,
    xpaths: &[&str],
    timeout: Duration,
) -> ApiResult<(usize, String)> {
    const POLL: Duration = Duration::from_millis(500);

    let mut waited = Duration::ZERO;
    loop {
        for (index, xpath) in xpaths.iter().enumerate() {
            if let Some(element) = browser.find(ctx, xpath).await? {
                return Ok((index, element));
            }
        }
        if waited >= timeout {
            return Err(ApiError::Unauthorized(format!(
                "none of {xpaths:?} appeared within {timeout:?}"
            )));
        }
        ctx.sleep(POLL).await?;
        waited += POLL;
    }
}
