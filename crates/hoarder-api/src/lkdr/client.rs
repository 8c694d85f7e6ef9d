//! HTTP implementation of the fiscal receipts API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoarder_core::clock::Clock;
use hoarder_core::context::Ctx;
use hoarder_core::convert::json_bridge;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::model::{Challenge, Failure, FiscalData, Receipts, Tokens};
use super::{LkdrApi, LkdrAuthApi};
use crate::auth::CredentialManager;
use crate::error::{ApiError, ApiResult};
use crate::http;

const PATH_CHALLENGE_START: &str = "auth/challenge/sms/start";
const PATH_CHALLENGE_VERIFY: &str = "auth/challenge/sms/verify";
const PATH_TOKEN: &str = "auth/token";
const PATH_RECEIPTS: &str = "receipt";
const PATH_FISCAL_DATA: &str = "receipt/fiscal_data";

const SOURCE_TYPE: &str = "WEB";
const APP_VERSION: &str = "1.0.0";
const ORDER_BY: &str = "RECEIVE_DATE:ASC";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceInfo<'a> {
    app_version: &'a str,
    meta_details: serde_json::Value,
    source_device_id: &'a str,
    source_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_from: Option<DateTime<Utc>>,
    limit: i64,
    offset: i64,
    order_by: &'static str,
}

/// Sends JSON requests and maps failure bodies to [`ApiError`] kinds.
pub struct LkdrTransport {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
    user_agent: String,
}

impl LkdrTransport {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, device_id: String, user_agent: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            device_id,
            user_agent,
        }
    }

    fn device_info(&self) -> DeviceInfo<'_> {
        DeviceInfo {
            app_version: APP_VERSION,
            meta_details: json!({ "userAgent": self.user_agent }),
            source_device_id: &self.device_id,
            source_type: SOURCE_TYPE,
        }
    }

    /// ## Summary
    /// Posts `body` to `path`, optionally with a bearer token.
    ///
    /// ## Errors
    /// Maps 401 to [`ApiError::InsufficientPrivileges`] and other failures to
    /// [`ApiError::Remote`] with the code and message of the error body.
    #[tracing::instrument(skip(self, ctx, token, body))]
    pub async fn post<B, T>(
        &self,
        ctx: &Ctx,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> ApiResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = http::send(ctx, request).await?;
        match http::json(ctx, response).await {
            Err(ApiError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                Err(ApiError::InsufficientPrivileges)
            }
            Err(ApiError::Status { status, body }) => Err(failure(status, &body)),
            result => result,
        }
    }
}

fn failure(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<Failure>(body) {
        Ok(failure) => ApiError::Remote {
            code: failure.code.unwrap_or_else(|| status.to_string()),
            message: failure.message.unwrap_or_default(),
        },
        Err(_err) => ApiError::Status {
            status,
            body: body.to_owned(),
        },
    }
}

#[async_trait]
impl LkdrAuthApi for LkdrTransport {
    async fn start_challenge(
        &self,
        ctx: &Ctx,
        phone: &str,
        captcha_token: &str,
    ) -> ApiResult<String> {
        let challenge: Challenge = self
            .post(ctx, PATH_CHALLENGE_START, None, &json!({
                "phone": phone,
                "captchaToken": captcha_token,
            }))
            .await?;
        Ok(challenge.challenge_token)
    }

    async fn verify(
        &self,
        ctx: &Ctx,
        phone: &str,
        challenge_token: &str,
        code: &str,
    ) -> ApiResult<Tokens> {
        self.post(ctx, PATH_CHALLENGE_VERIFY, None, &json!({
            "phone": phone,
            "challengeToken": challenge_token,
            "code": code,
            "deviceInfo": self.device_info(),
        }))
        .await
    }

    async fn refresh(&self, ctx: &Ctx, refresh_token: &str) -> ApiResult<Tokens> {
        self.post(ctx, PATH_TOKEN, None, &json!({
            "refreshToken": refresh_token,
            "deviceInfo": self.device_info(),
        }))
        .await
    }
}

/// Authenticated client of one phone.
pub struct HttpLkdrClient {
    transport: Arc<LkdrTransport>,
    credentials: Arc<CredentialManager<Tokens>>,
    clock: Arc<dyn Clock>,
}

impl HttpLkdrClient {
    #[must_use]
    pub fn new(
        transport: Arc<LkdrTransport>,
        credentials: Arc<CredentialManager<Tokens>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            credentials,
            clock,
        }
    }

    /// Returns usable tokens, refreshing them first when the access token has expired.
    async fn tokens(&self, ctx: &Ctx) -> ApiResult<Tokens> {
        let tokens = self.credentials.get(ctx).await?;
        if tokens.token_expire_in > self.clock.now() {
            return Ok(tokens);
        }
        tracing::debug!("Access token expired, refreshing");
        self.credentials.refresh(ctx).await
    }

    async fn post<B, T>(&self, ctx: &Ctx, path: &'static str, body: &B) -> ApiResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let tokens = self.tokens(ctx).await?;
        match self
            .transport
            .post(ctx, path, Some(&tokens.token), body)
            .await
        {
            Err(ApiError::InsufficientPrivileges) => {
                tracing::warn!(path, "Access token rejected, refreshing");
                let tokens = self.credentials.refresh(ctx).await?;
                self.transport
                    .post(ctx, path, Some(&tokens.token), body)
                    .await
            }
            result => result,
        }
    }
}

#[async_trait]
impl LkdrApi for HttpLkdrClient {
    async fn receipts(
        &self,
        ctx: &Ctx,
        date_from: Option<DateTime<Utc>>,
        offset: i64,
        limit: i64,
    ) -> ApiResult<Receipts> {
        self.post(ctx, PATH_RECEIPTS, &ReceiptsRequest {
            date_from,
            limit,
            offset,
            order_by: ORDER_BY,
        })
        .await
    }

    async fn fiscal_data(&self, ctx: &Ctx, key: &str) -> ApiResult<FiscalData> {
        let raw: Value = self
            .post(ctx, PATH_FISCAL_DATA, &json!({ "key": key }))
            .await?;
        decode_fiscal_data(raw)
    }
}

/// Fiscal documents come from the cash registers as-is; blank strings stand in for missing
/// numbers and dates.
fn decode_fiscal_data(raw: Value) -> ApiResult<FiscalData> {
    json_bridge(raw).map_err(|err| ApiError::Decode(err.to_string()))
}
