use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use hoarder_api::error::ApiError;
use hoarder_api::telegram::{BotCommand, Message, TelegramApi};
use hoarder_core::clock::Clock;
use hoarder_core::context::{Ctx, ask_fn};
use hoarder_core::conversation::Conversation;
use hoarder_core::error::CoreError;
use hoarder_core::lazy::Lazy;
use hoarder_service::error::ServiceResult;
use hoarder_service::job::{Registry, format_results, parse_job_ids};
use hoarder_service::trigger::Trigger;
use tokio::task::JoinHandle;
use tracing::Instrument;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Username of the bot, looked up on the first command.
type BotName = Lazy<Option<String>, ApiError>;

/// ## Summary
/// Whether `text` is meant for the bot named `me`. Group chats address commands as
/// `/command@bot`; a mention of another bot is not ours. Unmentioned text is always ours, and
/// so is every mention while our own name is unknown.
fn addressed_to(text: &str, me: Option<&str>) -> bool {
    let mention = text
        .split_whitespace()
        .next()
        .filter(|command| command.starts_with('/'))
        .and_then(|command| command.split_once('@'))
        .map(|(_, bot)| bot);
    match (mention, me) {
        (Some(bot), Some(me)) => bot.eq_ignore_ascii_case(me),
        _ => true,
    }
}

/// Chat bot: allowed senders run jobs by sending their ids and answer the jobs' questions.
pub struct TelegramTrigger {
    api: Arc<dyn TelegramApi>,
    users: HashMap<i64, String>,
    poll_timeout: Duration,
    typing_interval: Duration,
    conversation: Arc<Conversation<i64>>,
    me: Arc<BotName>,
    clock: Arc<dyn Clock>,
}

impl TelegramTrigger {
    #[must_use]
    pub fn new(
        api: Arc<dyn TelegramApi>,
        users: HashMap<i64, String>,
        poll_timeout: Duration,
        typing_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let me_api = Arc::clone(&api);
        let me = Lazy::new(move |ctx: Ctx| {
            let api = Arc::clone(&me_api);
            async move { api.get_me(&ctx).await.map(|me| me.username) }
        });
        Self {
            api,
            users,
            poll_timeout,
            typing_interval,
            conversation: Arc::new(Conversation::new()),
            me: Arc::new(me),
            clock,
        }
    }

    /// Routes one message: a reply to a pending question or a new command.
    fn handle(&self, ctx: &Ctx, registry: &Arc<Registry>, message: Message) -> Option<JoinHandle<()>> {
        let text = message.text?;
        let sender = message.from.map(|from| from.id);
        let Some(user) = sender.and_then(|sender| self.users.get(&sender)) else {
            tracing::warn!(sender = ?sender, "Ignoring message from unknown sender");
            return None;
        };
        let chat_id = message.chat.id;

        if self.conversation.answer(&chat_id, text.clone()).is_ok() {
            tracing::debug!(chat = chat_id, "Answer delivered");
            return None;
        }

        let ctx = ctx.with("user", user).with("chat", chat_id);
        let span = ctx.span();
        let run = CommandRun {
            api: Arc::clone(&self.api),
            conversation: Arc::clone(&self.conversation),
            registry: Arc::clone(registry),
            me: Arc::clone(&self.me),
            user: user.clone(),
            chat_id,
            text,
            typing_interval: self.typing_interval,
        };
        let now = self.clock.now();
        Some(tokio::spawn(async move { run.run(ctx, now).await }.instrument(span)))
    }
}

/// One command of one chat, executed in its own task.
struct CommandRun {
    api: Arc<dyn TelegramApi>,
    conversation: Arc<Conversation<i64>>,
    registry: Arc<Registry>,
    me: Arc<BotName>,
    user: String,
    chat_id: i64,
    text: String,
    typing_interval: Duration,
}

impl CommandRun {
    async fn run(self, ctx: Ctx, now: chrono::DateTime<chrono::Utc>) {
        let me = match self.me.get(&ctx).await {
            Ok(me) => me.as_deref(),
            Err(err) if err.is_cancelled() => return,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to look up the bot name");
                None
            }
        };
        if !addressed_to(&self.text, me) {
            tracing::debug!(text = %self.text, "Command is addressed to another bot");
            return;
        }
        let jobs = parse_job_ids(&self.text);

        let chat_id = self.chat_id;
        let api = Arc::clone(&self.api);
        let conversation = Arc::clone(&self.conversation);
        let ctx = ctx.with_ask_fn(ask_fn(move |ctx, prompt| {
            let api = Arc::clone(&api);
            let conversation = Arc::clone(&conversation);
            async move {
                conversation
                    .ask(&ctx, chat_id, |ctx, chat_id| async move {
                        api.send_message(&ctx, chat_id, &prompt)
                            .await
                            .map_err(|e| CoreError::AskFailed(e.to_string()))
                    })
                    .await
            }
        }));

        let (typing_ctx, stop_typing) = ctx.child();
        let typing = tokio::spawn(Self::typing(
            Arc::clone(&self.api),
            typing_ctx,
            chat_id,
            self.typing_interval,
        ));

        let results = self.registry.run(&ctx, now, &self.user, &jobs).await;
        stop_typing.cancel();
        if let Err(err) = typing.await {
            tracing::warn!(error = %err, "Typing indicator task failed");
        }

        if let Err(err) = self
            .api
            .send_message(&ctx, chat_id, &format_results(&results))
            .await
        {
            tracing::warn!(error = %err, "Failed to send results");
        }
    }

    /// Keeps the chat's typing indicator on until `ctx` is cancelled.
    async fn typing(api: Arc<dyn TelegramApi>, ctx: Ctx, chat_id: i64, interval: Duration) {
        loop {
            if let Err(err) = api.send_typing(&ctx, chat_id).await {
                if err.is_cancelled() {
                    break;
                }
                tracing::debug!(error = %err, "Failed to send typing indicator");
            }
            if ctx.sleep(interval).await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl Trigger for TelegramTrigger {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn run(&self, ctx: &Ctx, registry: Arc<Registry>) -> ServiceResult<()> {
        let commands = registry
            .jobs()
            .map(|job| BotCommand {
                command: job.id().to_owned(),
                description: job.info().to_owned(),
            })
            .collect();
        self.api.set_commands(ctx, commands).await?;

        let mut offset = 0;
        let mut runs: Vec<JoinHandle<()>> = Vec::new();
        while !ctx.is_cancelled() {
            let updates = match self.api.get_updates(ctx, offset, self.poll_timeout).await {
                Ok(updates) => updates,
                Err(err) if err.is_cancelled() => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to get updates");
                    if ctx.sleep(RETRY_DELAY).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(message) = update.message
                    && let Some(run) = self.handle(ctx, &registry, message)
                {
                    runs.push(run);
                }
            }
            runs.retain(|run| !run.is_finished());
        }

        join_all(runs).await;
        Ok(())
    }
}
