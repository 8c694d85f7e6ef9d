//! Fiscal receipts API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoarder_core::context::Ctx;

use crate::error::ApiResult;

pub mod client;
pub mod model;

pub use client::{HttpLkdrClient, LkdrTransport};

/// Unauthenticated calls that produce tokens.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait LkdrAuthApi: Send + Sync {
    /// Starts an SMS challenge and returns its token.
    async fn start_challenge(&self, ctx: &Ctx, phone: &str, captcha_token: &str)
    -> ApiResult<String>;

    async fn verify(
        &self,
        ctx: &Ctx,
        phone: &str,
        challenge_token: &str,
        code: &str,
    ) -> ApiResult<model::Tokens>;

    async fn refresh(&self, ctx: &Ctx, refresh_token: &str) -> ApiResult<model::Tokens>;
}

/// Authenticated data calls. Implementations own the tokens of one phone.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait LkdrApi: Send + Sync {
    async fn receipts(
        &self,
        ctx: &Ctx,
        date_from: Option<DateTime<Utc>>,
        offset: i64,
        limit: i64,
    ) -> ApiResult<model::Receipts>;

    async fn fiscal_data(&self, ctx: &Ctx, key: &str) -> ApiResult<model::FiscalData>;
}
