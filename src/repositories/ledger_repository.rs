use crate::error::{AppError, Result};
use crate::models::{Currency, EntryType, LedgerEntry, TransferType};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const COLUMNS: &str = "id, account_id, counterparty_account_id, transfer_id, entry_type, \
     transfer_type, amount, currency, balance_after, occurred_at, created_at";

const INSERT: &str = r#"
    INSERT INTO ledger_entries (id, account_id, counterparty_account_id, transfer_id, entry_type,
        transfer_type, amount, currency, balance_after, occurred_at, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (account_id, transfer_id, entry_type) DO NOTHING
"#;

#[derive(Debug, FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    account_id: Uuid,
    counterparty_account_id: Uuid,
    transfer_id: Uuid,
    entry_type: String,
    transfer_type: String,
    amount: i64,
    currency: String,
    balance_after: i64,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl LedgerEntryRow {
    fn into_entry(self) -> Result<LedgerEntry> {
        let entry_type: EntryType = self
            .entry_type
            .parse()
            .map_err(|e| AppError::Internal(anyhow!("corrupt ledger row: {}", e)))?;
        let transfer_type: TransferType = self
            .transfer_type
            .parse()
            .map_err(|e| AppError::Internal(anyhow!("corrupt ledger row: {}", e)))?;
        let currency = Currency::new(&self.currency)
            .map_err(|e| AppError::Internal(anyhow!("corrupt ledger row: {}", e)))?;
        Ok(LedgerEntry {
            id: self.id,
            account_id: self.account_id,
            counterparty_account_id: self.counterparty_account_id,
            transfer_id: self.transfer_id,
            entry_type,
            transfer_type,
            amount: self.amount,
            currency,
            balance_after: self.balance_after,
            occurred_at: self.occurred_at,
            created_at: self.created_at,
        })
    }
}

/// The append-only ledger. Every insert goes through the two recorder
/// methods, and the unique (account_id, transfer_id, entry_type) constraint
/// makes both of them idempotent.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<()> {
        sqlx::query(INSERT)
            .bind(entry.id)
            .bind(entry.account_id)
            .bind(entry.counterparty_account_id)
            .bind(entry.transfer_id)
            .bind(entry.entry_type.as_str())
            .bind(entry.transfer_type.as_str())
            .bind(entry.amount)
            .bind(entry.currency.as_str())
            .bind(entry.balance_after)
            .bind(entry.occurred_at)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Writes the debit and credit legs of a completed transfer or reversal
    /// inside the caller's transaction.
    pub async fn record_transfer_pair(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        debit: &LedgerEntry,
        credit: &LedgerEntry,
    ) -> Result<()> {
        debug_assert_eq!(debit.entry_type, EntryType::Debit);
        debug_assert_eq!(credit.entry_type, EntryType::Credit);
        debug_assert_eq!(debit.amount, credit.amount);
        debug_assert_eq!(debit.transfer_id, credit.transfer_id);

        self.insert(tx, debit).await?;
        self.insert(tx, credit).await?;
        Ok(())
    }

    /// Writes the single opening-balance credit for a newly opened account.
    pub async fn record_bootstrap_credit(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<()> {
        debug_assert_eq!(entry.transfer_type, TransferType::Bootstrap);
        debug_assert_eq!(entry.entry_type, EntryType::Credit);

        self.insert(tx, entry).await
    }

    pub async fn find_by_transfer(&self, transfer_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE transfer_id = $1
            ORDER BY occurred_at, id
            "#,
            COLUMNS
        ))
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(LedgerEntryRow::into_entry).collect()
    }

    /// The most recent entry strictly before `at`; the statement opening
    /// balance seek. O(log N) on (account_id, occurred_at).
    pub async fn last_entry_before(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE account_id = $1 AND occurred_at < $2
            ORDER BY occurred_at DESC, id DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(account_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(LedgerEntryRow::into_entry).transpose()
    }

    /// The most recent entry at or before `at`; the statement closing
    /// balance seek. Microsecond-accurate, never widened by a second.
    pub async fn last_entry_at_or_before(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE account_id = $1 AND occurred_at <= $2
            ORDER BY occurred_at DESC, id DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(account_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(LedgerEntryRow::into_entry).transpose()
    }

    pub async fn movements(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE account_id = $1 AND occurred_at >= $2 AND occurred_at <= $3
            ORDER BY occurred_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
            COLUMNS
        ))
        .bind(account_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(LedgerEntryRow::into_entry).collect()
    }

    pub async fn count_movements(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM ledger_entries
            WHERE account_id = $1 AND occurred_at >= $2 AND occurred_at <= $3
            "#,
        )
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

}
