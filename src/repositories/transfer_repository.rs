use crate::error::{AppError, ErrorCode, Result};
use crate::models::{Currency, Transfer, TransferStatus};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const COLUMNS: &str = "id, reference, source_account_id, destination_account_id, amount, currency, \
     description, idempotency_key, status, failure_code, failure_reason, created_at, updated_at, \
     completed_at, failed_at, reversed_at, version";

#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    reference: String,
    source_account_id: Uuid,
    destination_account_id: Uuid,
    amount: i64,
    currency: String,
    description: Option<String>,
    idempotency_key: Option<String>,
    status: String,
    failure_code: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    reversed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TransferRow {
    fn into_transfer(self) -> Result<Transfer> {
        let currency = Currency::new(&self.currency)
            .map_err(|e| AppError::Internal(anyhow!("corrupt transfer row: {}", e)))?;
        let status: TransferStatus = self
            .status
            .parse()
            .map_err(|e| AppError::Internal(anyhow!("corrupt transfer row: {}", e)))?;
        Ok(Transfer::reconstitute(
            self.id,
            self.reference,
            self.source_account_id,
            self.destination_account_id,
            self.amount,
            currency,
            self.description,
            self.idempotency_key,
            status,
            self.failure_code,
            self.failure_reason,
            self.created_at,
            self.updated_at,
            self.completed_at,
            self.failed_at,
            self.reversed_at,
            self.version,
        ))
    }
}

/// Raw-SQL persistence for the transfer aggregate. Only terminal outcomes
/// are ever written: the in-memory `processing` state never reaches a row.
#[derive(Clone)]
pub struct TransferRepository {
    pool: PgPool,
}

impl TransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(TransferRow::into_transfer).transpose()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Transfer> {
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::domain(
                ErrorCode::TransferNotFound,
                format!("transfer '{}' not found", id),
            )
        })
    }

    /// Pessimistic row lock for state transitions. Must run inside a
    /// transaction.
    pub async fn get_by_id_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<Transfer> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        row.map(TransferRow::into_transfer).transpose()?.ok_or_else(|| {
            AppError::domain(
                ErrorCode::TransferNotFound,
                format!("transfer '{}' not found", id),
            )
        })
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE idempotency_key = $1",
            COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(TransferRow::into_transfer).transpose()
    }

    /// In-transaction variant used by the initiate handler to close the
    /// crash-after-commit window.
    pub async fn find_by_idempotency_key_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        key: &str,
    ) -> Result<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE idempotency_key = $1",
            COLUMNS
        ))
        .bind(key)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        row.map(TransferRow::into_transfer).transpose()
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE reference = $1",
            COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(TransferRow::into_transfer).transpose()
    }

    /// One code path for first insertion and every later state transition.
    pub async fn upsert(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        transfer: &Transfer,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (id, reference, source_account_id, destination_account_id, amount,
                currency, description, idempotency_key, status, failure_code, failure_reason,
                created_at, updated_at, completed_at, failed_at, reversed_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                failure_code = EXCLUDED.failure_code,
                failure_reason = EXCLUDED.failure_reason,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at,
                failed_at = EXCLUDED.failed_at,
                reversed_at = EXCLUDED.reversed_at,
                version = EXCLUDED.version
            "#,
        )
        .bind(transfer.id)
        .bind(&transfer.reference)
        .bind(transfer.source_account_id)
        .bind(transfer.destination_account_id)
        .bind(transfer.amount)
        .bind(transfer.currency.as_str())
        .bind(&transfer.description)
        .bind(&transfer.idempotency_key)
        .bind(transfer.status.as_str())
        .bind(&transfer.failure_code)
        .bind(&transfer.failure_reason)
        .bind(transfer.created_at)
        .bind(transfer.updated_at)
        .bind(transfer.completed_at)
        .bind(transfer.failed_at)
        .bind(transfer.reversed_at)
        .bind(transfer.version)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn list(
        &self,
        status: Option<TransferStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            r#"
            SELECT {}
            FROM transfers
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(TransferRow::into_transfer).collect()
    }

    pub async fn count(&self, status: Option<TransferStatus>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transfers WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    /// Transfers touching an account on either side, newest first.
    pub async fn list_for_account(
        &self,
        account_id: Uuid,
        status: Option<TransferStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            r#"
            SELECT {}
            FROM transfers
            WHERE (source_account_id = $1 OR destination_account_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            COLUMNS
        ))
        .bind(account_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(TransferRow::into_transfer).collect()
    }

    pub async fn count_for_account(
        &self,
        account_id: Uuid,
        status: Option<TransferStatus>,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM transfers
            WHERE (source_account_id = $1 OR destination_account_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(account_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }
}
