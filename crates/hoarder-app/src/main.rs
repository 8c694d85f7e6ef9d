use futures::future::join_all;
use hoarder_app::{logging, setup};
use hoarder_core::config::load_config;
use hoarder_core::context::Ctx;

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_config()?;
    if settings.dump.values {
        print!("{}", settings.dump_values()?);
        return Ok(());
    }

    logging::init(&settings.log)?;
    tracing::info!("Starting hoarder");

    let ctx = Ctx::background();
    let app = setup::build(&ctx, &settings).await?;
    tracing::info!(jobs = app.registry.jobs().count(), "Jobs registered");

    let cancel = ctx.cancellation().clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested");
        cancel.cancel();
    });

    let failed = app.triggers.run(&ctx, app.registry).await;
    ctx.cancellation().cancel();
    join_all(app.background).await;

    if failed > 0 {
        anyhow::bail!("{failed} trigger(s) failed");
    }
    tracing::info!("Stopped");
    Ok(())
}
