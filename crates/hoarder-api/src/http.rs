//! Plumbing shared by the HTTP clients.

use std::time::Duration;

use hoarder_core::context::Ctx;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// ## Summary
/// Builds a `reqwest` client with a cookie store and the given user agent.
///
/// ## Errors
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(user_agent: Option<&str>, timeout: Duration) -> ApiResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .cookie_store(true)
        .gzip(true);
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent.to_owned());
    }
    Ok(builder.build()?)
}

/// ## Summary
/// Sends `request` unless the context is cancelled first.
///
/// ## Errors
/// Returns transport errors or [`hoarder_core::error::CoreError::Cancelled`].
pub async fn send(ctx: &Ctx, request: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
    Ok(ctx.run(request.send()).await??)
}

/// ## Summary
/// Reads the body of a successful response as JSON.
///
/// ## Errors
/// Returns [`ApiError::Status`] for non-2xx responses and [`ApiError::Decode`] for bodies that
/// do not match `T`.
pub async fn json<T: DeserializeOwned>(ctx: &Ctx, response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    let body = ctx.run(response.bytes()).await??;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// ## Summary
/// Checks that a response without a meaningful body succeeded.
///
/// ## Errors
/// Returns [`ApiError::Status`] for non-2xx responses.
pub async fn ensure_success(ctx: &Ctx, response: reqwest::Response) -> ApiResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = ctx.run(response.text()).await??;
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Exponential backoff for retry `attempt` (starting at 1) with up to 50% random jitter.
#[must_use]
pub fn backoff(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE
        .checked_mul(1 << attempt.saturating_sub(1).min(16))
        .unwrap_or(BACKOFF_MAX)
        .min(BACKOFF_MAX);
    exp + jitter(exp / 2)
}

fn jitter(max: Duration) -> Duration {
    let millis = max.as_millis();
    if millis == 0 {
        return Duration::ZERO;
    }
    let random = uuid::Uuid::new_v4().as_u128() % millis;
    Duration::from_millis(u64::try_from(random).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_within_jitter() {
        for attempt in 1..=4 {
            let base = Duration::from_secs(1 << (attempt - 1));
            let delay = backoff(attempt);
            assert!(delay >= base, "attempt {attempt}: {delay:?}");
            assert!(delay <= base + base / 2, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn backoff_is_capped() {
        let delay = backoff(30);
        assert!(delay >= BACKOFF_MAX);
        assert!(delay <= BACKOFF_MAX + BACKOFF_MAX / 2);
    }
}
