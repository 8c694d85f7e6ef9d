use diesel::Connection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

const TINKOFF: EmbeddedMigrations = embed_migrations!("migrations/tinkoff");
const LKDR: EmbeddedMigrations = embed_migrations!("migrations/lkdr");

/// Database families; each lives in its own database with its own migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Tinkoff,
    Lkdr,
}

/// ## Summary
/// Runs pending migrations of `family` against `database_url`.
///
/// ## Errors
/// Returns an error if connecting or applying a migration fails.
#[tracing::instrument(skip(database_url))]
pub async fn run_migrations(database_url: &str, family: Family) -> anyhow::Result<()> {
    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || {
        let mut conn = diesel::PgConnection::establish(&url)?;
        let applied = match family {
            Family::Tinkoff => conn.run_pending_migrations(TINKOFF),
            Family::Lkdr => conn.run_pending_migrations(LKDR),
        }
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;

        tracing::info!(count = applied.len(), "Migrations applied");
        Ok::<_, anyhow::Error>(())
    })
    .await??;

    Ok(())
}
