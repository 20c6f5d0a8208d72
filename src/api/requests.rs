use crate::error::Violation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to open a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub owner_name: String,
    pub currency: String,
    #[serde(default)]
    pub initial_balance: i64,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        if self.owner_name.trim().is_empty() {
            violations.push(Violation::new("owner_name", "owner_name must not be blank"));
        }
        if self.owner_name.len() > 255 {
            violations.push(Violation::new(
                "owner_name",
                "owner_name must not exceed 255 characters",
            ));
        }
        if !is_currency_code(&self.currency) {
            violations.push(Violation::new(
                "currency",
                "currency must be a 3-letter upper-case ISO 4217 code",
            ));
        }
        if self.initial_balance < 0 {
            violations.push(Violation::new(
                "initial_balance",
                "initial_balance must not be negative",
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Request to initiate a transfer. The idempotency key travels in the
/// X-Idempotency-Key header, not in the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
}

impl CreateTransferRequest {
    pub fn validate(&self) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        if self.amount <= 0 {
            violations.push(Violation::new("amount", "amount must be positive"));
        }
        if !is_currency_code(&self.currency) {
            violations.push(Violation::new(
                "currency",
                "currency must be a 3-letter upper-case ISO 4217 code",
            ));
        }
        if self.source_account_id == self.destination_account_id {
            violations.push(Violation::new(
                "destination_account_id",
                "source and destination accounts must differ",
            ));
        }
        if let Some(description) = &self.description {
            if description.len() > 500 {
                violations.push(Violation::new(
                    "description",
                    "description must not exceed 500 characters",
                ));
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Query parameters for paginated listings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(50).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Query parameters for the statement endpoint. Timestamps are RFC 3339,
/// with or without fractional seconds.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatementParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_account_request_valid() {
        let request = CreateAccountRequest {
            owner_name: "Ada Lovelace".to_string(),
            currency: "USD".to_string(),
            initial_balance: 10_000,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_account_request_blank_owner() {
        let request = CreateAccountRequest {
            owner_name: "   ".to_string(),
            currency: "USD".to_string(),
            initial_balance: 0,
        };
        let violations = request.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.field == "owner_name"));
    }

    #[test]
    fn test_create_account_request_bad_currency_and_balance() {
        let request = CreateAccountRequest {
            owner_name: "Ada".to_string(),
            currency: "usd".to_string(),
            initial_balance: -5,
        };
        let violations = request.validate().unwrap_err();
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_create_transfer_request_valid() {
        let request = CreateTransferRequest {
            source_account_id: Uuid::new_v4(),
            destination_account_id: Uuid::new_v4(),
            amount: 2_500,
            currency: "USD".to_string(),
            description: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_transfer_request_same_account() {
        let id = Uuid::new_v4();
        let request = CreateTransferRequest {
            source_account_id: id,
            destination_account_id: id,
            amount: 100,
            currency: "USD".to_string(),
            description: None,
        };
        let violations = request.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.field == "destination_account_id"));
    }

    #[test]
    fn test_create_transfer_request_zero_amount() {
        let request = CreateTransferRequest {
            source_account_id: Uuid::new_v4(),
            destination_account_id: Uuid::new_v4(),
            amount: 0,
            currency: "USD".to_string(),
            description: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_list_query_clamping() {
        let query = ListQuery {
            status: None,
            page: Some(0),
            per_page: Some(1_000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 100);
        assert_eq!(query.offset(), 0);

        let query = ListQuery {
            status: None,
            page: Some(3),
            per_page: Some(20),
        };
        assert_eq!(query.offset(), 40);
    }
}
