use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, PgPool, Postgres};
use tokio::time::Instant;
use tracing::warn;

/// Cached HTTP outcome for one idempotency key. A key maps to exactly one
/// request hash; the same key with a different hash is a client bug.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub request_hash: String,
    pub response_status: i16,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        idempotency_key: String,
        request_hash: String,
        response_status: u16,
        response_body: serde_json::Value,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            idempotency_key,
            request_hash,
            response_status: response_status as i16,
            response_body,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// SHA-256 over method|path|body. Binding the method and path prevents the
/// same key colliding across different operations.
pub fn request_fingerprint(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Advisory-lock key for one idempotency key: the first eight bytes of
/// SHA-256("idp:" + key), interpreted as a big-endian i64.
pub fn advisory_lock_key(idempotency_key: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(b"idp:");
    hasher.update(idempotency_key.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Postgres storage for the HTTP-layer idempotency cache.
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Looks up a live (non-expired) record.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT idempotency_key, request_hash, response_status, response_body, created_at, expires_at
            FROM idempotency_keys
            WHERE idempotency_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(record)
    }

    /// Insert-if-absent, so a race between two identical first requests
    /// cannot corrupt the cache.
    pub async fn save(&self, record: &IdempotencyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (idempotency_key, request_hash, response_status, response_body, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(&record.idempotency_key)
        .bind(&record.request_hash)
        .bind(record.response_status)
        .bind(&record.response_body)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

/// A session-level Postgres advisory lock held on a dedicated pool
/// connection. Release it explicitly on every path; an unreleased lock
/// lives until the connection is torn down.
pub struct AdvisoryLock {
    conn: PoolConnection<Postgres>,
    key: i64,
    released: bool,
}

impl AdvisoryLock {
    /// Polls pg_try_advisory_lock until acquired or the timeout elapses.
    /// Returns None on timeout.
    pub async fn acquire(
        pool: &PgPool,
        key: i64,
        timeout: std::time::Duration,
    ) -> Result<Option<Self>> {
        let mut conn = pool.acquire().await.map_err(AppError::Database)?;
        let deadline = Instant::now() + timeout;

        loop {
            let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
                .bind(key)
                .fetch_one(&mut *conn)
                .await
                .map_err(AppError::Database)?;

            if locked {
                return Ok(Some(Self {
                    conn,
                    key,
                    released: false,
                }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    pub async fn release(mut self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .execute(&mut *self.conn)
            .await
            .map_err(AppError::Database)?;
        self.released = true;
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if !self.released {
            // The pooled connection goes back holding the session lock; the
            // caller missed a release path.
            warn!(key = self.key, "advisory lock dropped without release");
        }
    }
}

/// Background deletion of expired idempotency records.
pub struct IdempotencyCleanupJob {
    store: IdempotencyStore,
    interval_seconds: u64,
}

impl IdempotencyCleanupJob {
    pub fn new(pool: PgPool, interval_seconds: u64) -> Self {
        Self {
            store: IdempotencyStore::new(pool),
            interval_seconds,
        }
    }

    pub async fn run_once(&self) -> Result<u64> {
        self.store.cleanup_expired().await
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(self.interval_seconds));
            loop {
                interval.tick().await;
                match self.store.cleanup_expired().await {
                    Ok(count) if count > 0 => {
                        tracing::info!(count, "expired idempotency records removed");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(error = %err, "idempotency cleanup failed");
                    }
                }
            }
        })
    }
}
