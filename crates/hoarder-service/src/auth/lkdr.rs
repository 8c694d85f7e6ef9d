use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::auth::Authorize;
use hoarder_api::captcha::CaptchaSolver;
use hoarder_api::error::ApiResult;
use hoarder_api::lkdr::LkdrAuthApi;
use hoarder_api::lkdr::model::Tokens;
use hoarder_core::clock::Clock;
use hoarder_core::context::Ctx;

use super::{ask_for_phone, require_ask_fn};

/// Obtains fiscal service tokens: refreshes while the refresh token is valid, otherwise solves
/// the captcha and passes the SMS challenge.
pub struct LkdrLogin {
    api: Arc<dyn LkdrAuthApi>,
    captcha: Arc<dyn CaptchaSolver>,
    site_key: String,
    page_url: String,
    phone: String,
    clock: Arc<dyn Clock>,
}

impl LkdrLogin {
    #[must_use]
    pub fn new(
        api: Arc<dyn LkdrAuthApi>,
        captcha: Arc<dyn CaptchaSolver>,
        site_key: String,
        page_url: String,
        phone: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            captcha,
            site_key,
            page_url,
            phone,
            clock,
        }
    }

    async fn challenge(&self, ctx: &Ctx) -> ApiResult<Tokens> {
        let captcha_token = self
            .captcha
            .solve(ctx, &self.site_key, &self.page_url)
            .await?;
        let challenge = self
            .api
            .start_challenge(ctx, &self.phone, &captcha_token)
            .await?;
        let code = ctx.ask("Enter the SMS code from the tax service").await?;
        self.api
            .verify(ctx, &self.phone, &challenge, code.trim())
            .await
    }
}

#[async_trait]
impl Authorize<Tokens> for LkdrLogin {
    #[tracing::instrument(skip_all, fields(phone = %self.phone))]
    async fn authorize(&self, ctx: &Ctx, previous: Option<Tokens>) -> ApiResult<Tokens> {
        let ctx = ask_for_phone(ctx, &self.phone);

        if let Some(previous) = previous.filter(|tokens| tokens.can_refresh(self.clock.now())) {
            match self.api.refresh(&ctx, &previous.refresh_token).await {
                Ok(tokens) => {
                    tracing::debug!("Tokens refreshed");
                    return Ok(tokens);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => tracing::warn!(error = %err, "Token refresh failed"),
            }
        }

        require_ask_fn(&ctx)?;
        let tokens = self.challenge(&ctx).await?;
        tracing::info!("Tokens authorized");
        Ok(tokens)
    }
}
