//! Wire format of the bank API.
//!
//! Common endpoints answer with an envelope whose `resultCode` selects the outcome; the
//! brokerage gateway answers with plain JSON and reports failures through the status code.

use async_trait::async_trait;
use hoarder_core::context::Ctx;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::TinkoffAuthApi;
use super::model::{LevelUp, Ping};
use crate::error::{ApiError, ApiResult};
use crate::http;

const RESULT_OK: &str = "OK";
const RESULT_WAITING_CONFIRMATION: &str = "WAITING_CONFIRMATION";
const RESULT_RATE_LIMIT: &str = "REQUEST_RATE_LIMIT_EXCEEDED";
const RESULT_INSUFFICIENT_PRIVILEGES: &str = "INSUFFICIENT_PRIVILEGES";
const RESULT_NO_DATA_FOUND: &str = "NO_DATA_FOUND";

/// Client identification sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub app_name: String,
    pub app_version: String,
    pub origin: String,
    pub device_id: String,
}

impl Device {
    #[must_use]
    pub fn web(device_id: String) -> Self {
        Self {
            app_name: "web".to_owned(),
            app_version: "0.0.1".to_owned(),
            origin: "web,ib5,platform".to_owned(),
            device_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    result_code: String,
    payload: Option<T>,
    plain_message: Option<String>,
    error_message: Option<String>,
    operation_ticket: Option<String>,
}

/// Successful envelope contents.
#[derive(Debug)]
pub struct Reply<T> {
    pub payload: Option<T>,
    pub operation_ticket: Option<String>,
}

impl<T> Reply<T> {
    /// ## Errors
    /// Returns [`ApiError::Decode`] when the envelope carried no payload.
    pub fn into_payload(self) -> ApiResult<T> {
        self.payload
            .ok_or_else(|| ApiError::Decode("missing payload".to_owned()))
    }
}

fn classify<T>(envelope: Envelope<T>) -> ApiResult<Reply<T>> {
    match envelope.result_code.as_str() {
        RESULT_OK | RESULT_WAITING_CONFIRMATION => Ok(Reply {
            payload: envelope.payload,
            operation_ticket: envelope.operation_ticket,
        }),
        RESULT_RATE_LIMIT => Err(ApiError::RateLimitExceeded),
        RESULT_INSUFFICIENT_PRIVILEGES => Err(ApiError::InsufficientPrivileges),
        RESULT_NO_DATA_FOUND => Err(ApiError::NoDataFound),
        _ => Err(ApiError::Remote {
            message: envelope
                .plain_message
                .or(envelope.error_message)
                .unwrap_or_default(),
            code: envelope.result_code,
        }),
    }
}

pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    invest_url: String,
    device: Device,
}

impl Transport {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, invest_url: &str, device: Device) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            invest_url: invest_url.trim_end_matches('/').to_owned(),
            device,
        }
    }

    /// ## Summary
    /// Calls an enveloped endpoint with form parameters.
    ///
    /// ## Errors
    /// Maps the envelope's result code to [`ApiError`] kinds; transport and decoding errors are
    /// returned as they are.
    #[tracing::instrument(skip(self, ctx, session_id, params))]
    pub async fn call<T: DeserializeOwned>(
        &self,
        ctx: &Ctx,
        path: &str,
        session_id: Option<&str>,
        params: &[(&str, String)],
    ) -> ApiResult<Reply<T>> {
        let mut query = vec![
            ("appName", self.device.app_name.as_str()),
            ("appVersion", self.device.app_version.as_str()),
            ("origin", self.device.origin.as_str()),
            ("wuid", self.device.device_id.as_str()),
        ];
        if let Some(session_id) = session_id {
            query.push(("sessionid", session_id));
        }

        let request = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .query(&query)
            .form(params);
        let response = http::send(ctx, request).await?;
        let envelope: Envelope<T> = http::json(ctx, response).await?;
        classify(envelope)
    }

    /// ## Summary
    /// Calls a brokerage gateway endpoint.
    ///
    /// ## Errors
    /// Maps 429 to [`ApiError::RateLimitExceeded`], 401 and 403 to
    /// [`ApiError::InsufficientPrivileges`], 404 to [`ApiError::NoDataFound`].
    #[tracing::instrument(skip(self, ctx, session_id, params))]
    pub async fn call_plain<T: DeserializeOwned>(
        &self,
        ctx: &Ctx,
        path: &str,
        session_id: &str,
        params: &[(&str, String)],
    ) -> ApiResult<T> {
        let request = self
            .http
            .get(format!("{}/{path}", self.invest_url))
            .query(&[("sessionId", session_id)])
            .query(params);
        let response = http::send(ctx, request).await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimitExceeded),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ApiError::InsufficientPrivileges)
            }
            StatusCode::NOT_FOUND => Err(ApiError::NoDataFound),
            _ => http::json(ctx, response).await,
        }
    }
}

#[async_trait]
impl TinkoffAuthApi for Transport {
    async fn new_session(&self, ctx: &Ctx) -> ApiResult<String> {
        self.call::<String>(ctx, "session", None, &[])
            .await?
            .into_payload()
    }

    async fn sign_up(&self, ctx: &Ctx, session_id: &str, phone: &str) -> ApiResult<String> {
        let reply = self
            .call::<serde_json::Value>(ctx, "sign_up", Some(session_id), &[(
                "phone",
                phone.to_owned(),
            )])
            .await?;
        reply
            .operation_ticket
            .ok_or_else(|| ApiError::Decode("missing operation ticket".to_owned()))
    }

    async fn confirm(
        &self,
        ctx: &Ctx,
        session_id: &str,
        ticket: &str,
        code: &str,
    ) -> ApiResult<()> {
        let confirmation = serde_json::json!({ "SMSBYID": code }).to_string();
        self.call::<serde_json::Value>(ctx, "confirm", Some(session_id), &[
            ("initialOperation", "sign_up".to_owned()),
            ("initialOperationTicket", ticket.to_owned()),
            ("confirmationData", confirmation),
        ])
        .await?;
        Ok(())
    }

    async fn password(&self, ctx: &Ctx, session_id: &str, password: &str) -> ApiResult<()> {
        self.call::<serde_json::Value>(ctx, "sign_up", Some(session_id), &[(
            "password",
            password.to_owned(),
        )])
        .await?;
        Ok(())
    }

    async fn level_up(&self, ctx: &Ctx, session_id: &str) -> ApiResult<String> {
        let level: LevelUp = self
            .call(ctx, "level_up", Some(session_id), &[])
            .await?
            .into_payload()?;
        Ok(level.access_level)
    }

    async fn ping(&self, ctx: &Ctx, session_id: &str) -> ApiResult<String> {
        let ping: Ping = self
            .call(ctx, "ping", Some(session_id), &[])
            .await?
            .into_payload()?;
        Ok(ping.access_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(code: &str) -> Envelope<u32> {
        Envelope {
            result_code: code.to_owned(),
            payload: Some(7),
            plain_message: Some("Попробуйте позже".to_owned()),
            error_message: None,
            operation_ticket: None,
        }
    }

    #[test]
    fn result_codes_map_to_error_kinds() {
        assert_eq!(classify(envelope("OK")).unwrap().payload, Some(7));
        assert!(matches!(
            classify(envelope("REQUEST_RATE_LIMIT_EXCEEDED")),
            Err(ApiError::RateLimitExceeded)
        ));
        assert!(matches!(
            classify(envelope("INSUFFICIENT_PRIVILEGES")),
            Err(ApiError::InsufficientPrivileges)
        ));
        assert!(matches!(
            classify(envelope("NO_DATA_FOUND")),
            Err(ApiError::NoDataFound)
        ));
    }

    #[test]
    fn unknown_code_keeps_message() {
        let err = classify(envelope("INTERNAL_ERROR")).unwrap_err();

        assert_eq!(err.to_string(), "INTERNAL_ERROR: Попробуйте позже");
    }

    #[test]
    fn waiting_confirmation_carries_ticket() {
        let mut waiting = envelope("WAITING_CONFIRMATION");
        waiting.operation_ticket = Some("ticket".to_owned());

        let reply = classify(waiting).unwrap();

        assert_eq!(reply.operation_ticket.as_deref(), Some("ticket"));
    }
}
