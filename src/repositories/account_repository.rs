use crate::error::{AppError, ErrorCode, Result};
use crate::models::{Account, AccountStatus, Currency};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const COLUMNS: &str =
    "id, owner_name, currency, balance, status, created_at, updated_at, closed_at, version";

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    owner_name: String,
    currency: String,
    balance: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl AccountRow {
    fn into_account(self) -> Result<Account> {
        let currency = Currency::new(&self.currency)
            .map_err(|e| AppError::Internal(anyhow!("corrupt account row: {}", e)))?;
        let status: AccountStatus = self
            .status
            .parse()
            .map_err(|e| AppError::Internal(anyhow!("corrupt account row: {}", e)))?;
        Ok(Account::reconstitute(
            self.id,
            self.owner_name,
            currency,
            self.balance,
            status,
            self.created_at,
            self.updated_at,
            self.closed_at,
            self.version,
        ))
    }
}

/// Raw-SQL persistence for the account aggregate. The only place that knows
/// the `accounts` columns.
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(AccountRow::into_account).transpose()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Account> {
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::domain(
                ErrorCode::AccountNotFound,
                format!("account '{}' not found", id),
            )
        })
    }

    /// Pessimistic row lock. Must run inside a transaction.
    pub async fn find_by_id_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        row.map(AccountRow::into_account).transpose()
    }

    pub async fn get_by_id_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<Account> {
        self.find_by_id_for_update(tx, id).await?.ok_or_else(|| {
            AppError::domain(
                ErrorCode::AccountNotFound,
                format!("account '{}' not found", id),
            )
        })
    }

    /// One code path for first insertion and every later state transition.
    pub async fn upsert(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        account: &Account,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_name, currency, balance, status, created_at, updated_at, closed_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                balance = EXCLUDED.balance,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                closed_at = EXCLUDED.closed_at,
                version = EXCLUDED.version
            "#,
        )
        .bind(account.id)
        .bind(&account.owner_name)
        .bind(account.currency.as_str())
        .bind(account.balance)
        .bind(account.status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(account.closed_at)
        .bind(account.version)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn list(
        &self,
        status: Option<AccountStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {}
            FROM accounts
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

        rows.into_iter().map(AccountRow::into_account).collect()
    }

    pub async fn count(&self, status: Option<AccountStatus>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM accounts WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }
}
