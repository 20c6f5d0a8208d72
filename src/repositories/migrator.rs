use crate::error::Result;
use anyhow::{anyhow, Context};
use sqlx::PgPool;
use tracing::info;

/// Namespaced advisory-lock key for the migration run, so concurrent
/// replicas never race the schema.
const MIGRATION_LOCK_KEY: i64 = 0x7472_616e_7366_6572; // "transfer"

/// Runs the embedded migrations behind a named advisory lock with a 10 s
/// wait, then releases it whatever the outcome.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let mut conn = pool.acquire().await.context("acquiring migration connection")?;

    sqlx::query("SET lock_timeout = '10s'")
        .execute(&mut *conn)
        .await
        .context("setting migration lock timeout")?;
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await
        .context("acquiring migration advisory lock")?;

    let outcome = sqlx::migrate!("./migrations").run(pool).await;

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await
        .ok();

    outcome.map_err(|e| anyhow!("migration failed: {}", e))?;
    info!("migrations applied");
    Ok(())
}
