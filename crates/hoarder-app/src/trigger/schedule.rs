use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use hoarder_core::clock::Clock;
use hoarder_core::context::Ctx;
use hoarder_service::error::ServiceResult;
use hoarder_service::job::Registry;
use hoarder_service::trigger::Trigger;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// ## Summary
/// First instant at or after `now` that is a whole multiple of `interval` since the epoch.
#[must_use]
pub fn next_tick(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let millis = now.timestamp_millis();
    let rounded = millis.div_euclid(step) * step;
    let tick = if rounded == millis { rounded } else { rounded.saturating_add(step) };
    DateTime::from_timestamp_millis(tick).unwrap_or(now)
}

/// Runs the configured jobs of every user on a fixed interval.
pub struct ScheduleTrigger {
    interval: Duration,
    users: BTreeMap<String, Vec<String>>,
    clock: Arc<dyn Clock>,
}

impl ScheduleTrigger {
    #[must_use]
    pub fn new(
        interval: Duration,
        users: BTreeMap<String, Vec<String>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            interval,
            users,
            clock,
        }
    }

    fn spawn_runs(
        &self,
        ctx: &Ctx,
        registry: &Arc<Registry>,
        tick: DateTime<Utc>,
    ) -> Vec<JoinHandle<()>> {
        self.users
            .iter()
            .map(|(user, jobs)| {
                let ctx = ctx.with("user", user);
                let span = ctx.span();
                let registry = Arc::clone(registry);
                let user = user.clone();
                let jobs = jobs.clone();
                tokio::spawn(
                    async move {
                        let results = registry.run(&ctx, tick, &user, &jobs).await;
                        let failed = results.iter().filter(|result| !result.is_ok()).count();
                        tracing::info!(jobs = results.len(), failed, "Scheduled run finished");
                    }
                    .instrument(span),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Trigger for ScheduleTrigger {
    fn id(&self) -> &str {
        "schedule"
    }

    async fn run(&self, ctx: &Ctx, registry: Arc<Registry>) -> ServiceResult<()> {
        let step = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
        let mut tick = next_tick(self.clock.now(), self.interval);
        let mut runs: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let wait = (tick - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(%tick, "Waiting for next tick");
            if ctx.sleep(wait).await.is_err() {
                break;
            }

            runs.retain(|run| !run.is_finished());
            runs.extend(self.spawn_runs(ctx, &registry, tick));
            tick = tick.checked_add_signed(step).unwrap_or(tick);
        }

        join_all(runs).await;
        Ok(())
    }
}
