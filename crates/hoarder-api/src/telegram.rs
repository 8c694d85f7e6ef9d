//! Telegram Bot API client.

use std::time::Duration;

use async_trait::async_trait;
use hoarder_core::context::Ctx;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::http;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> ApiResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ApiError::Decode("missing result".to_owned())),
            (false, _) => Err(ApiError::Remote {
                code: self.error_code.map_or_else(String::new, |code| code.to_string()),
                message: self.description.unwrap_or_default(),
            }),
        }
    }
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// The bot's own account.
    async fn get_me(&self, ctx: &Ctx) -> ApiResult<User>;

    /// Long-polls updates after `offset`, waiting up to `timeout` for the first one.
    async fn get_updates(&self, ctx: &Ctx, offset: i64, timeout: Duration)
    -> ApiResult<Vec<Update>>;

    async fn send_message(&self, ctx: &Ctx, chat_id: i64, text: &str) -> ApiResult<()>;

    async fn send_typing(&self, ctx: &Ctx, chat_id: i64) -> ApiResult<()>;

    async fn set_commands(&self, ctx: &Ctx, commands: Vec<BotCommand>) -> ApiResult<()>;
}

pub struct HttpTelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTelegramClient {
    #[must_use]
    pub fn new(http: reqwest::Client, api_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        ctx: &Ctx,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> ApiResult<T> {
        let mut request = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = http::send(ctx, request).await?;
        let envelope: Envelope<T> = match http::json(ctx, response).await {
            Ok(envelope) => envelope,
            Err(ApiError::Status { body, status }) => serde_json::from_str(&body)
                .map_err(|_err| ApiError::Status { status, body })?,
            Err(err) => return Err(err),
        };
        envelope.into_result()
    }
}

#[async_trait]
impl TelegramApi for HttpTelegramClient {
    async fn get_me(&self, ctx: &Ctx) -> ApiResult<User> {
        self.call(ctx, "getMe", json!({}), None).await
    }

    async fn get_updates(
        &self,
        ctx: &Ctx,
        offset: i64,
        timeout: Duration,
    ) -> ApiResult<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call(ctx, "getUpdates", body, Some(timeout + Duration::from_secs(10)))
            .await
    }

    #[tracing::instrument(skip(self, ctx, text))]
    async fn send_message(&self, ctx: &Ctx, chat_id: i64, text: &str) -> ApiResult<()> {
        let body = json!({ "chat_id": chat_id, "text": text });
        self.call::<serde_json::Value>(ctx, "sendMessage", body, None)
            .await?;
        Ok(())
    }

    async fn send_typing(&self, ctx: &Ctx, chat_id: i64) -> ApiResult<()> {
        let body = json!({ "chat_id": chat_id, "action": "typing" });
        self.call::<bool>(ctx, "sendChatAction", body, None).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn set_commands(&self, ctx: &Ctx, commands: Vec<BotCommand>) -> ApiResult<()> {
        let body = json!({ "commands": commands });
        self.call::<bool>(ctx, "setMyCommands", body, None).await?;
        Ok(())
    }
}
