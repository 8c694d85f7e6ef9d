//! Named jobs and the registry that fans a trigger's request out to them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hoarder_core::context::Ctx;
use hoarder_core::lock::KeyedMutex;
use tracing::Instrument;

use crate::error::JobError;

pub mod format;

pub use format::{format_results, parse_job_ids};

/// Job id that selects every registered job.
pub const ALL: &str = "all";

/// A unit of work a trigger can run for one user.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Job: Send + Sync {
    fn id(&self) -> &str;

    /// One-line description shown in command lists.
    fn info(&self) -> &str;

    /// ## Summary
    /// Runs the job for `user_id`, treating `now` as the current time.
    ///
    /// ## Errors
    /// Returns a [`JobError`] describing what failed; reported failures are aggregated into
    /// [`JobError::Failed`].
    async fn run(&self, ctx: &Ctx, now: DateTime<Utc>, user_id: &str) -> Result<(), JobError>;
}

/// Lets at most one run of the wrapped job per user proceed; others fail fast.
pub struct Exclusive {
    job: Arc<dyn Job>,
    running: KeyedMutex<String>,
}

impl Exclusive {
    #[must_use]
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            job,
            running: KeyedMutex::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.job.id()
    }

    #[must_use]
    pub fn info(&self) -> &str {
        self.job.info()
    }

    /// ## Summary
    /// Runs the job unless it is already running for `user_id`.
    ///
    /// ## Errors
    /// Returns [`JobError::AlreadyRunning`] for a concurrent run, otherwise the job's own error.
    pub async fn run(&self, ctx: &Ctx, now: DateTime<Utc>, user_id: &str) -> Result<(), JobError> {
        let Some(_guard) = self.running.try_lock(&user_id.to_owned()) else {
            tracing::warn!(job = self.id(), user = user_id, "Job is already running");
            return Err(JobError::AlreadyRunning);
        };
        self.job.run(ctx, now, user_id).await
    }
}

/// Outcome of one job of a registry run.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: String,
    pub error: Option<JobError>,
}

impl JobResult {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Registry {
    jobs: Vec<Exclusive>,
}

impl Registry {
    #[must_use]
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        Self {
            jobs: jobs.into_iter().map(Exclusive::new).collect(),
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Exclusive> {
        self.jobs.iter()
    }

    /// ## Summary
    /// Runs the jobs named in `job_ids` concurrently for `user_id` and waits for all of them.
    ///
    /// An empty selection or [`ALL`] selects every job. Results come back in registration
    /// order, followed by one error result per unknown id. A failing job never cancels its
    /// siblings.
    pub async fn run(
        &self,
        ctx: &Ctx,
        now: DateTime<Utc>,
        user_id: &str,
        job_ids: &[String],
    ) -> Vec<JobResult> {
        let all = job_ids.is_empty() || job_ids.iter().any(|id| id == ALL);
        let selected: Vec<&Exclusive> = self
            .jobs
            .iter()
            .filter(|job| all || job_ids.iter().any(|id| id == job.id()))
            .collect();

        let unknown = job_ids
            .iter()
            .filter(|id| *id != ALL && !self.jobs.iter().any(|job| job.id() == id.as_str()))
            .map(|id| JobResult {
                job_id: id.clone(),
                error: Some(JobError::UnknownJob(id.clone())),
            });

        let runs = selected.into_iter().map(|job| {
            let ctx = ctx.with("job", job.id());
            let span = ctx.span();
            async move {
                tracing::info!("Job started");
                let result = job.run(&ctx, now, user_id).await;
                match &result {
                    Ok(()) => tracing::info!("Job finished"),
                    Err(err) => tracing::warn!(error = %err, "Job failed"),
                }
                JobResult {
                    job_id: job.id().to_owned(),
                    error: result.err(),
                }
            }
            .instrument(span)
        });

        let mut results = join_all(runs).await;
        results.extend(unknown);
        results
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hoarder_core::context::Errors;

    use super::*;

    struct Sleepy {
        id: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Job for Sleepy {
        fn id(&self) -> &str {
            self.id
        }

        fn info(&self) -> &str {
            "sleeps"
        }

        async fn run(&self, ctx: &Ctx, _now: DateTime<Utc>, user_id: &str) -> Result<(), JobError> {
            ctx.sleep(Duration::from_millis(50))
                .await
                .map_err(|_err| JobError::Cancelled)?;
            if self.fail {
                return Err(JobError::Failed(Errors::from(format!("{user_id}: boom"))));
            }
            Ok(())
        }
    }

    fn registry() -> Registry {
        Registry::new(vec![
            Arc::new(Sleepy {
                id: "tinkoff",
                fail: false,
            }),
            Arc::new(Sleepy {
                id: "lkdr",
                fail: true,
            }),
        ])
    }

    #[test_log::test(tokio::test)]
    async fn test_all_runs_every_job_in_registration_order() {
        let results = registry()
            .run(&Ctx::background(), Utc::now(), "alice", &["all".to_owned()])
            .await;

        let ids: Vec<_> = results.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, ["tinkoff", "lkdr"]);
        assert!(results[0].is_ok());
        assert!(matches!(results[1].error, Some(JobError::Failed(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_job_is_reported() {
        let results = registry()
            .run(&Ctx::background(), Utc::now(), "alice", &[
                "lkdr".to_owned(),
                "bogus".to_owned(),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].job_id, "lkdr");
        assert!(matches!(&results[1].error, Some(JobError::UnknownJob(id)) if id == "bogus"));
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_run_for_same_user_fails_fast() {
        let registry = registry();
        let ctx = Ctx::background();
        let ids = ["tinkoff".to_owned()];

        let (first, second, other) = tokio::join!(
            registry.run(&ctx, Utc::now(), "alice", &ids),
            registry.run(&ctx, Utc::now(), "alice", &ids),
            registry.run(&ctx, Utc::now(), "bob", &ids),
        );

        assert!(first[0].is_ok());
        assert!(matches!(second[0].error, Some(JobError::AlreadyRunning)));
        assert!(other[0].is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_selection_means_all() {
        let results = registry().run(&Ctx::background(), Utc::now(), "alice", &[]).await;

        assert_eq!(results.len(), 2);
    }
}
