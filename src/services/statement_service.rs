use crate::error::{AppError, DomainError, ErrorCode, Result};
use crate::models::LedgerEntry;
use crate::repositories::{AccountRepository, LedgerRepository};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub const MAX_RANGE_DAYS: i64 = 366;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone)]
pub struct StatementQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug)]
pub struct Statement {
    pub account_id: Uuid,
    pub currency: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub opening_balance: i64,
    pub closing_balance: i64,
    pub movements: Vec<LedgerEntry>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// The inverted-range check runs before the day-count check: a day count on
/// an inverted range is unsigned and would otherwise slip through.
pub fn validate_window(query: &StatementQuery) -> std::result::Result<(), DomainError> {
    if query.from >= query.to {
        return Err(DomainError::new(
            ErrorCode::InvalidDateRange,
            "'from' must be earlier than 'to'",
        ));
    }
    if query.to - query.from > Duration::days(MAX_RANGE_DAYS) {
        return Err(DomainError::new(
            ErrorCode::InvalidDateRange,
            format!("statement range must not exceed {} days", MAX_RANGE_DAYS),
        ));
    }
    if query.page < 1 {
        return Err(DomainError::validation("page must be at least 1"));
    }
    if query.per_page < 1 || query.per_page > MAX_PER_PAGE {
        return Err(DomainError::validation(format!(
            "per_page must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }
    Ok(())
}

/// Account statements from balance-snapshot seeks: opening and closing
/// balances are single index seeks on (account_id, occurred_at), never a
/// SUM().
pub struct StatementService {
    accounts: AccountRepository,
    ledger: LedgerRepository,
}

impl StatementService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool),
        }
    }

    pub async fn statement(&self, account_id: Uuid, query: StatementQuery) -> Result<Statement> {
        validate_window(&query).map_err(AppError::Domain)?;
        let account = self.accounts.get_by_id(account_id).await?;

        let opening_balance = self
            .ledger
            .last_entry_before(account_id, query.from)
            .await?
            .map(|entry| entry.balance_after)
            .unwrap_or(0);

        let total = self
            .ledger
            .count_movements(account_id, query.from, query.to)
            .await?;
        let offset = (query.page - 1) * query.per_page;
        let movements = self
            .ledger
            .movements(account_id, query.from, query.to, query.per_page, offset)
            .await?;

        // Strict <= on the upper bound, microsecond-accurate. Widening by a
        // second would include entries outside the movements range.
        let closing_balance = if total > 0 {
            self.ledger
                .last_entry_at_or_before(account_id, query.to)
                .await?
                .map(|entry| entry.balance_after)
                .unwrap_or(opening_balance)
        } else {
            opening_balance
        };

        Ok(Statement {
            account_id,
            currency: account.currency.as_str().to_string(),
            from: query.from,
            to: query.to,
            opening_balance,
            closing_balance,
            movements,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn query(from: DateTime<Utc>, to: DateTime<Utc>) -> StatementQuery {
        StatementQuery {
            from,
            to,
            page: 1,
            per_page: 50,
        }
    }

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_valid_window() {
        assert!(validate_window(&query(jan(1), jan(31))).is_ok());
    }

    #[test]
    fn test_inverted_range_rejected_before_day_count() {
        let err = validate_window(&query(jan(31), jan(1))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDateRange);

        let err = validate_window(&query(jan(1), jan(1))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDateRange);
    }

    #[test]
    fn test_range_longer_than_366_days_rejected() {
        let from = jan(1);
        let to = from + Duration::days(367);
        let err = validate_window(&query(from, to)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDateRange);

        let to = from + Duration::days(366);
        assert!(validate_window(&query(from, to)).is_ok());
    }

    #[test]
    fn test_per_page_bounds() {
        let mut q = query(jan(1), jan(31));
        q.per_page = 0;
        assert!(validate_window(&q).is_err());
        q.per_page = 101;
        assert!(validate_window(&q).is_err());
        q.per_page = 100;
        assert!(validate_window(&q).is_ok());
        q.per_page = 1;
        assert!(validate_window(&q).is_ok());
    }

    #[test]
    fn test_page_must_be_positive() {
        let mut q = query(jan(1), jan(31));
        q.page = 0;
        assert!(validate_window(&q).is_err());
    }
}
