use crate::error::{AppError, Result};
use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

/// Retries after the initial attempt; the fourth failure propagates.
const MAX_RETRIES: u32 = 3;

pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 't>>;

/// Serialisable transaction boundary with deadlock retry. The closure must
/// be re-executable: aggregates are rebuilt or reloaded with row locks
/// inside it, and nothing it does may survive a rollback.
#[derive(Clone)]
pub struct TxManager {
    pool: PgPool,
}

impl TxManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn transactional<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'t> Fn(&'t mut Transaction<'static, Postgres>) -> TxFuture<'t, T>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;

            match op(&mut tx).await {
                Ok(value) => match tx.commit().await {
                    Ok(()) => return Ok(value),
                    Err(err) if is_deadlock(&err) && attempt <= MAX_RETRIES => {
                        warn!(attempt, error = %err, "deadlock on commit, retrying");
                        backoff(attempt).await;
                    }
                    Err(err) => return Err(AppError::Database(err)),
                },
                Err(err) => {
                    tx.rollback().await.ok();
                    if is_retryable(&err) && attempt <= MAX_RETRIES {
                        warn!(attempt, error = %err, "deadlock detected, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Postgres reports deadlocks as 40P01 and serialisation failures as 40001.
fn is_deadlock(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("40001") | Some("40P01")
        ),
        _ => false,
    }
}

fn is_retryable(err: &AppError) -> bool {
    match err {
        AppError::Database(db) => is_deadlock(db),
        _ => false,
    }
}

/// Randomised exponential backoff: 10-50 ms scaled by the attempt number.
async fn backoff(attempt: u32) {
    let base = rand::thread_rng().gen_range(10..=50);
    tokio::time::sleep(Duration::from_millis(base * attempt as u64)).await;
}
