use crate::error::{AppError, Result};
use crate::observability::get_metrics;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

/// Outcome of cross-checking one account against its ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Match,
    /// The snapshot agrees with the account but the summed amounts do not:
    /// a corrupt intermediate entry the snapshot check alone would miss.
    LedgerSumMismatch,
    Mismatch,
    NoLedgerEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountReconciliation {
    pub account_id: Uuid,
    pub currency: String,
    pub account_balance: i64,
    pub ledger_balance: Option<i64>,
    pub computed_balance: Option<i64>,
    pub status: ReconciliationStatus,
    /// account balance minus the ledger's view; zero on match.
    pub difference: i64,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub results: Vec<AccountReconciliation>,
}

#[derive(Debug, FromRow)]
struct ReconciliationRow {
    account_id: Uuid,
    currency: String,
    balance: i64,
    ledger_balance: Option<i64>,
    computed_balance: Option<i64>,
}

pub fn classify(
    account_balance: i64,
    ledger_balance: Option<i64>,
    computed_balance: Option<i64>,
) -> (ReconciliationStatus, i64) {
    match ledger_balance {
        None => {
            if account_balance != 0 {
                (ReconciliationStatus::NoLedgerEntry, account_balance)
            } else {
                (ReconciliationStatus::Match, 0)
            }
        }
        Some(snapshot) => {
            if snapshot != account_balance {
                (ReconciliationStatus::Mismatch, account_balance - snapshot)
            } else {
                match computed_balance {
                    Some(computed) if computed != account_balance => (
                        ReconciliationStatus::LedgerSumMismatch,
                        account_balance - computed,
                    ),
                    _ => (ReconciliationStatus::Match, 0),
                }
            }
        }
    }
}

/// Cross-checks every account balance against the last ledger snapshot and
/// the summed credits minus debits. Strictly read-only: no transactions, no
/// row locks, never in the way of live traffic.
pub struct ReconciliationService {
    pool: PgPool,
}

impl ReconciliationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn reconcile_all(&self) -> Result<ReconciliationReport> {
        let rows = sqlx::query_as::<_, ReconciliationRow>(
            r#"
            SELECT a.id AS account_id,
                   a.currency,
                   a.balance,
                   latest.balance_after AS ledger_balance,
                   summed.computed AS computed_balance
            FROM accounts a
            LEFT JOIN LATERAL (
                SELECT e.balance_after
                FROM ledger_entries e
                WHERE e.account_id = a.id
                ORDER BY e.occurred_at DESC, e.id DESC
                LIMIT 1
            ) latest ON TRUE
            LEFT JOIN LATERAL (
                SELECT SUM(CASE WHEN e.entry_type = 'credit' THEN e.amount ELSE -e.amount END)::BIGINT AS computed
                FROM ledger_entries e
                WHERE e.account_id = a.id
            ) summed ON TRUE
            ORDER BY a.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let mut results = Vec::with_capacity(rows.len());
        let mut matched = 0usize;
        for row in rows {
            let (status, difference) =
                classify(row.balance, row.ledger_balance, row.computed_balance);
            if status == ReconciliationStatus::Match {
                matched += 1;
            } else {
                warn!(
                    account_id = %row.account_id,
                    ?status,
                    difference,
                    "reconciliation discrepancy"
                );
            }
            results.push(AccountReconciliation {
                account_id: row.account_id,
                currency: row.currency,
                account_balance: row.balance,
                ledger_balance: row.ledger_balance,
                computed_balance: row.computed_balance,
                status,
                difference,
            });
        }

        let checked = results.len();
        let mismatched = checked - matched;
        get_metrics().record_reconciliation(checked as u64, mismatched as u64);

        Ok(ReconciliationReport {
            checked,
            matched,
            mismatched,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_match() {
        assert_eq!(
            classify(10_000, Some(10_000), Some(10_000)),
            (ReconciliationStatus::Match, 0)
        );
    }

    #[test]
    fn test_classify_match_without_computed_sum() {
        assert_eq!(
            classify(10_000, Some(10_000), None),
            (ReconciliationStatus::Match, 0)
        );
    }

    #[test]
    fn test_classify_snapshot_mismatch() {
        assert_eq!(
            classify(10_000, Some(9_000), Some(9_000)),
            (ReconciliationStatus::Mismatch, 1_000)
        );
    }

    #[test]
    fn test_classify_sum_mismatch_behind_matching_snapshot() {
        assert_eq!(
            classify(10_000, Some(10_000), Some(8_000)),
            (ReconciliationStatus::LedgerSumMismatch, 2_000)
        );
    }

    #[test]
    fn test_classify_no_ledger_entry() {
        assert_eq!(
            classify(500, None, None),
            (ReconciliationStatus::NoLedgerEntry, 500)
        );
    }

    #[test]
    fn test_classify_empty_account_without_ledger_matches() {
        assert_eq!(classify(0, None, None), (ReconciliationStatus::Match, 0));
    }
}
