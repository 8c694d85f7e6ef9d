use std::sync::Arc;

use async_trait::async_trait;
use hoarder_core::clock::Clock;
use hoarder_core::context::{Ctx, ask_fn};
use hoarder_core::error::{CoreError, CoreResult};
use hoarder_service::error::ServiceResult;
use hoarder_service::job::{Registry, format_results, parse_job_ids};
use hoarder_service::trigger::Trigger;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::Mutex;

/// Prompts on the terminal and reads answers line by line.
struct Console<R, W> {
    input: Mutex<Lines<R>>,
    output: Mutex<W>,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&self, text: &str) -> CoreResult<()> {
        let mut output = self.output.lock().await;
        output
            .write_all(text.as_bytes())
            .await
            .map_err(|e| CoreError::AskFailed(e.to_string()))?;
        output
            .flush()
            .await
            .map_err(|e| CoreError::AskFailed(e.to_string()))
    }

    /// ## Summary
    /// Writes `prompt` and reads one line; `None` once the input is closed.
    async fn prompt(&self, ctx: &Ctx, prompt: &str) -> CoreResult<Option<String>> {
        self.write(prompt).await?;
        let mut input = self.input.lock().await;
        ctx.run(input.next_line())
            .await?
            .map(|line| line.map(|line| line.trim().to_owned()))
            .map_err(|e| CoreError::AskFailed(e.to_string()))
    }
}

/// Interactive console: asks for a user and jobs, runs them, prints the results.
pub struct StdinTrigger<R, W> {
    console: Arc<Console<R, W>>,
    clock: Arc<dyn Clock>,
}

impl<R, W> StdinTrigger<R, W> {
    #[must_use]
    pub fn new(input: R, output: W, clock: Arc<dyn Clock>) -> Self
    where
        R: AsyncBufRead,
    {
        Self {
            console: Arc::new(Console {
                input: Mutex::new(input.lines()),
                output: Mutex::new(output),
            }),
            clock,
        }
    }
}

#[async_trait]
impl<R, W> Trigger for StdinTrigger<R, W>
where
    R: AsyncBufRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        "stdin"
    }

    async fn run(&self, ctx: &Ctx, registry: Arc<Registry>) -> ServiceResult<()> {
        let console = Arc::clone(&self.console);
        let ctx = ctx.with_ask_fn(ask_fn(move |ctx, prompt| {
            let console = Arc::clone(&console);
            async move {
                console
                    .prompt(&ctx, &format!("{prompt}: "))
                    .await?
                    .ok_or_else(|| CoreError::AskFailed("input closed".to_owned()))
            }
        }));

        loop {
            let user = match self.console.prompt(&ctx, "user: ").await {
                Ok(Some(user)) => user,
                Ok(None) | Err(CoreError::Cancelled) => break,
                Err(err) => return Err(err.into()),
            };
            if user.is_empty() {
                continue;
            }
            let Some(jobs) = self.console.prompt(&ctx, "jobs: ").await? else {
                break;
            };

            let ctx = ctx.with("user", &user);
            let results = registry
                .run(&ctx, self.clock.now(), &user, &parse_job_ids(&jobs))
                .await;
            self.console
                .write(&format!("{}\n", format_results(&results)))
                .await?;
        }

        tracing::debug!("Console closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use hoarder_core::clock::SystemClock;
    use hoarder_core::context::Errors;
    use hoarder_service::error::JobError;
    use hoarder_service::job::Job;

    use super::*;

    struct AskingJob;

    #[async_trait]
    impl Job for AskingJob {
        fn id(&self) -> &str {
            "ask"
        }

        fn info(&self) -> &str {
            "Asks for a code"
        }

        async fn run(&self, ctx: &Ctx, _now: DateTime<Utc>, _user_id: &str) -> Result<(), JobError> {
            let code = ctx
                .ask("code")
                .await
                .map_err(|e| JobError::ServiceError(e.into()))?;
            if code == "1234" {
                Ok(())
            } else {
                Err(JobError::Failed(Errors::from(format!("bad code {code}"))))
            }
        }
    }

    async fn session(input: &'static [u8]) -> String {
        let output = Arc::new(Mutex::new(Vec::new()));
        let trigger = StdinTrigger::new(input, SharedOutput(Arc::clone(&output)), Arc::new(SystemClock));

        trigger
            .run(&Ctx::background(), Arc::new(Registry::new(vec![Arc::new(AskingJob)])))
            .await
            .unwrap();

        let bytes = output.lock().await.clone();
        String::from_utf8(bytes).unwrap()
    }

    /// Output the test can read back after the trigger owns the writer.
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl AsyncWrite for SharedOutput {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            match self.0.try_lock() {
                Ok(mut out) => {
                    out.extend_from_slice(buf);
                    std::task::Poll::Ready(Ok(buf.len()))
                }
                Err(err) => std::task::Poll::Ready(Err(std::io::Error::other(err))),
            }
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_answer_is_read_from_the_next_line() {
        let output = session(b"alice\nask\n1234\n").await;

        assert_eq!(output, "user: jobs: code: ✔ ask\nuser: ");
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_job_is_reported() {
        let output = session(b"alice\nnope\n").await;

        assert!(output.contains("✘ nope: unknown job \"nope\""));
    }
}
