//! Authorization strategies plugged into [`hoarder_api::auth::CredentialManager`].

use std::sync::Arc;

use hoarder_api::error::{ApiError, ApiResult};
use hoarder_core::context::{AskFn, Ctx};
use hoarder_core::error::CoreError;

pub mod lkdr;
pub mod tinkoff_api;
pub mod tinkoff_browser;

pub use lkdr::LkdrLogin;
pub use tinkoff_api::ApiChallenge;
pub use tinkoff_browser::{BrowserLogin, BrowserLoginSettings};

/// ## Summary
/// Prefixes every prompt asked through `ctx` with `phone`, so a human answering for several
/// phones knows which one a code belongs to.
#[must_use]
pub fn ask_for_phone(ctx: &Ctx, phone: &str) -> Ctx {
    let phone = phone.to_owned();
    ctx.apply_ask_fn(move |ask: AskFn| -> AskFn {
        Arc::new(move |ctx, prompt| ask(ctx, format!("{phone}: {prompt}")))
    })
}

/// ## Summary
/// Fails before a strategy triggers an SMS or opens a browser nobody can answer for.
///
/// ## Errors
/// Returns [`CoreError::NoAskFn`] when `ctx` carries no ask-function.
pub fn require_ask_fn(ctx: &Ctx) -> ApiResult<()> {
    if ctx.has_ask_fn() {
        Ok(())
    } else {
        Err(ApiError::Core(CoreError::NoAskFn))
    }
}

#[cfg(test)]
mod tests {
    use hoarder_core::context::ask_fn;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_prompt_is_prefixed_with_phone() {
        let ctx = Ctx::background().with_ask_fn(ask_fn(|_ctx, prompt| async move { Ok(prompt) }));

        let reply = ask_for_phone(&ctx, "+7000").ask("SMS code").await.unwrap();

        assert_eq!(reply, "+7000: SMS code");
    }

    #[test_log::test(tokio::test)]
    async fn test_context_without_ask_fn_stays_without() {
        let ctx = ask_for_phone(&Ctx::background(), "+7000");

        assert!(!ctx.has_ask_fn());
    }
}
