//! Captcha solving through the RuCaptcha service.

use std::time::Duration;

use async_trait::async_trait;
use hoarder_core::context::Ctx;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::http;

const METHOD: &str = "yandex";
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Produces captcha tokens for a page.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// ## Summary
    /// Solves the captcha identified by `site_key` on `page_url` and returns its token.
    ///
    /// ## Errors
    /// Returns [`ApiError::Remote`] when the service rejects the task and
    /// [`ApiError::Unauthorized`] when no answer arrives in time.
    async fn solve(&self, ctx: &Ctx, site_key: &str, page_url: &str) -> ApiResult<String>;
}

#[derive(Debug, Deserialize)]
struct Answer {
    status: i32,
    request: String,
}

impl Answer {
    fn into_result(self) -> ApiResult<Option<String>> {
        match (self.status, self.request.as_str()) {
            (1, _) => Ok(Some(self.request)),
            (_, NOT_READY) => Ok(None),
            _ => Err(ApiError::Remote {
                code: "CAPTCHA".to_owned(),
                message: self.request,
            }),
        }
    }
}

pub struct RuCaptcha {
    http: reqwest::Client,
    base_url: String,
    key: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl RuCaptcha {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        key: String,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            key,
            poll_interval,
            timeout,
        }
    }

    async fn submit(&self, ctx: &Ctx, site_key: &str, page_url: &str) -> ApiResult<String> {
        let request = self
            .http
            .post(format!("{}/in.php", self.base_url))
            .form(&[
                ("key", self.key.as_str()),
                ("method", METHOD),
                ("sitekey", site_key),
                ("pageurl", page_url),
                ("json", "1"),
            ]);
        let answer: Answer = http::json(ctx, http::send(ctx, request).await?).await?;
        answer
            .into_result()?
            .ok_or_else(|| ApiError::Decode("captcha task id missing".to_owned()))
    }

    async fn poll(&self, ctx: &Ctx, task_id: &str) -> ApiResult<Option<String>> {
        let request = self
            .http
            .get(format!("{}/res.php", self.base_url))
            .query(&[
                ("key", self.key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ]);
        let answer: Answer = http::json(ctx, http::send(ctx, request).await?).await?;
        answer.into_result()
    }
}

#[async_trait]
impl CaptchaSolver for RuCaptcha {
    #[tracing::instrument(skip(self, ctx))]
    async fn solve(&self, ctx: &Ctx, site_key: &str, page_url: &str) -> ApiResult<String> {
        let task_id = self.submit(ctx, site_key, page_url).await?;
        tracing::debug!(task_id, "Captcha task submitted");

        let mut waited = Duration::ZERO;
        while waited < self.timeout {
            ctx.sleep(self.poll_interval).await?;
            waited += self.poll_interval;
            if let Some(token) = self.poll(ctx, &task_id).await? {
                tracing::debug!(task_id, ?waited, "Captcha solved");
                return Ok(token);
            }
        }
        Err(ApiError::Unauthorized(format!(
            "captcha {task_id} not solved within {:?}",
            self.timeout
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(status: i32, request: &str) -> Answer {
        Answer {
            status,
            request: request.to_owned(),
        }
    }

    #[test]
    fn ready_answer_carries_token() {
        assert_eq!(answer(1, "token").into_result().unwrap().as_deref(), Some("token"));
    }

    #[test]
    fn pending_answer_is_none() {
        assert!(answer(0, NOT_READY).into_result().unwrap().is_none());
    }

    #[test]
    fn service_error_is_remote() {
        let err = answer(0, "ERROR_ZERO_BALANCE").into_result().unwrap_err();

        assert_eq!(err.to_string(), "CAPTCHA: ERROR_ZERO_BALANCE");
    }
}
