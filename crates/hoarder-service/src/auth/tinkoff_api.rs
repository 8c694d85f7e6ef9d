use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::auth::Authorize;
use hoarder_api::error::ApiResult;
use hoarder_api::tinkoff::{Session, TinkoffAuthApi};
use hoarder_core::context::Ctx;

use super::{ask_for_phone, require_ask_fn};

/// Signs in through the bank API: phone, SMS code, password, then a level-up of the session.
pub struct ApiChallenge {
    api: Arc<dyn TinkoffAuthApi>,
    phone: String,
    password: String,
}

impl ApiChallenge {
    #[must_use]
    pub fn new(api: Arc<dyn TinkoffAuthApi>, phone: String, password: String) -> Self {
        Self {
            api,
            phone,
            password,
        }
    }
}

#[async_trait]
impl Authorize<Session> for ApiChallenge {
    #[tracing::instrument(skip_all, fields(phone = %self.phone))]
    async fn authorize(&self, ctx: &Ctx, _previous: Option<Session>) -> ApiResult<Session> {
        require_ask_fn(ctx)?;
        let ctx = ask_for_phone(ctx, &self.phone);

        let session_id = self.api.new_session(&ctx).await?;
        let ticket = self.api.sign_up(&ctx, &session_id, &self.phone).await?;
        let code = ctx.ask("Enter the SMS code from the bank").await?;
        self.api
            .confirm(&ctx, &session_id, &ticket, code.trim())
            .await?;
        self.api.password(&ctx, &session_id, &self.password).await?;
        let access_level = self.api.level_up(&ctx, &session_id).await?;

        tracing::info!(access_level = %access_level, "Session authorized");
        Ok(Session {
            id: session_id,
            access_level: Some(access_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use hoarder_api::error::ApiError;
    use hoarder_api::tinkoff::MockTinkoffAuthApi;
    use hoarder_core::context::ask_fn;
    use hoarder_core::error::CoreError;
    use mockall::Sequence;
    use mockall::predicate::eq;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_flow_confirms_code_and_levels_up() {
        let mut api = MockTinkoffAuthApi::new();
        let mut seq = Sequence::new();
        api.expect_new_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("sid".to_owned()));
        api.expect_sign_up()
            .withf(|_, sid, phone| sid == "sid" && phone == "+7000")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("ticket".to_owned()));
        api.expect_confirm()
            .withf(|_, sid, ticket, code| sid == "sid" && ticket == "ticket" && code == "1234")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        api.expect_password()
            .with(mockall::predicate::always(), eq("sid"), eq("secret"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        api.expect_level_up()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("CLIENT".to_owned()));

        let prompts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&prompts);
        let ctx = Ctx::background().with_ask_fn(ask_fn(move |_ctx, prompt| {
            seen.lock().unwrap().push(prompt);
            async { Ok(" 1234\n".to_owned()) }
        }));

        let challenge = ApiChallenge::new(Arc::new(api), "+7000".to_owned(), "secret".to_owned());
        let session = challenge.authorize(&ctx, None).await.unwrap();

        assert_eq!(session, Session {
            id: "sid".to_owned(),
            access_level: Some("CLIENT".to_owned()),
        });
        assert_eq!(*prompts.lock().unwrap(), ["+7000: Enter the SMS code from the bank"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_no_sms_is_sent_without_an_ask_fn() {
        let mut api = MockTinkoffAuthApi::new();
        api.expect_new_session().never();
        api.expect_sign_up().never();

        let challenge = ApiChallenge::new(Arc::new(api), "+7000".to_owned(), "secret".to_owned());
        let err = challenge
            .authorize(&Ctx::background(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Core(CoreError::NoAskFn)));
    }
}
