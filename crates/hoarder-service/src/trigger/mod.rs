//! Trigger supervision.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use hoarder_core::context::Ctx;
use tracing::Instrument;

use crate::error::ServiceResult;
use crate::job::Registry;

/// Something that decides when jobs run: a timer, a console, a chat.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn id(&self) -> &str;

    /// ## Summary
    /// Serves requests until `ctx` is cancelled.
    ///
    /// ## Errors
    /// Returns an error when the trigger cannot keep running.
    async fn run(&self, ctx: &Ctx, registry: Arc<Registry>) -> ServiceResult<()>;
}

pub struct Triggers {
    triggers: Vec<Arc<dyn Trigger>>,
}

impl Triggers {
    #[must_use]
    pub fn new(triggers: Vec<Arc<dyn Trigger>>) -> Self {
        Self { triggers }
    }

    /// ## Summary
    /// Runs every trigger in its own task and waits for all of them to finish.
    ///
    /// A failing trigger is logged and leaves the others running. Returns how many failed.
    pub async fn run(self, ctx: &Ctx, registry: Arc<Registry>) -> usize {
        let tasks = self.triggers.into_iter().map(|trigger| {
            let ctx = ctx.with("trigger", trigger.id());
            let registry = Arc::clone(&registry);
            let span = ctx.span();
            tokio::spawn(
                async move {
                    tracing::info!("Trigger started");
                    let result = trigger.run(&ctx, registry).await;
                    match &result {
                        Ok(()) => tracing::info!("Trigger stopped"),
                        Err(err) => tracing::error!(error = %err, "Trigger failed"),
                    }
                    result.is_ok()
                }
                .instrument(span),
            )
        });

        join_all(tasks)
            .await
            .into_iter()
            .filter(|joined| match joined {
                Ok(ok) => !ok,
                Err(err) => {
                    tracing::error!(error = %err, "Trigger task panicked");
                    true
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::ServiceError;

    struct Waiting {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Trigger for Waiting {
        fn id(&self) -> &str {
            "waiting"
        }

        async fn run(&self, ctx: &Ctx, _registry: Arc<Registry>) -> ServiceResult<()> {
            ctx.cancellation().cancelled().await;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Trigger for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        async fn run(&self, _ctx: &Ctx, _registry: Arc<Registry>) -> ServiceResult<()> {
            Err(ServiceError::InvalidValue("no token".to_owned()))
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_failure_leaves_other_triggers_running_until_cancelled() {
        let ctx = Ctx::background();
        let stopped = Arc::new(AtomicBool::new(false));
        let triggers = Triggers::new(vec![
            Arc::new(Broken),
            Arc::new(Waiting {
                stopped: Arc::clone(&stopped),
            }),
        ]);

        let cancel = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let failed = triggers
            .run(&ctx, Arc::new(Registry::new(Vec::new())))
            .await;

        assert_eq!(failed, 1);
        assert!(stopped.load(Ordering::SeqCst));
    }
}
