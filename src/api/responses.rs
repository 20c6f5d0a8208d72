use crate::error::{AppError, ErrorCode, Violation};
use crate::models::{Account, AccountStatus, LedgerEntry, Transfer, TransferStatus};
use crate::observability::{HealthStatus, ServiceHealth};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Envelope: success carries {"data": ...}, errors carry {"error": {...}};
/// the absent half is omitted entirely.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorBody) -> ApiResponse<()> {
        ApiResponse {
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            violations: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Domain(err) => {
                let status = err.code.http_status();
                let body = ApiResponse::<()>::error(ErrorBody {
                    code: err.code.as_str().to_string(),
                    message: err.message,
                    violations: err.violations,
                });
                let mut response = (status, Json(body)).into_response();
                if err.code == ErrorCode::IdempotencyLockTimeout {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from_static("5"));
                }
                response
            }
            other => {
                tracing::error!(error = %other, "unhandled internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::<()>::error(ErrorBody::new(
                        "INTERNAL_ERROR",
                        "an internal error occurred",
                    ))),
                )
                    .into_response()
            }
        }
    }
}

/// Account DTO.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub owner_name: String,
    pub currency: String,
    pub balance: i64,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            owner_name: account.owner_name,
            currency: account.currency.as_str().to_string(),
            balance: account.balance,
            status: account.status,
            created_at: account.created_at,
            updated_at: account.updated_at,
            closed_at: account.closed_at,
            version: account.version,
        }
    }
}

/// Transfer DTO.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResponse {
    pub id: Uuid,
    pub reference: String,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub status: TransferStatus,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<Transfer> for TransferResponse {
    fn from(transfer: Transfer) -> Self {
        Self {
            id: transfer.id,
            reference: transfer.reference,
            source_account_id: transfer.source_account_id,
            destination_account_id: transfer.destination_account_id,
            amount: transfer.amount,
            currency: transfer.currency.as_str().to_string(),
            description: transfer.description,
            status: transfer.status,
            failure_code: transfer.failure_code,
            failure_reason: transfer.failure_reason,
            created_at: transfer.created_at,
            updated_at: transfer.updated_at,
            completed_at: transfer.completed_at,
            failed_at: transfer.failed_at,
            reversed_at: transfer.reversed_at,
            version: transfer.version,
        }
    }
}

/// One statement movement.
#[derive(Debug, Clone, Serialize)]
pub struct MovementResponse {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub counterparty_account_id: Uuid,
    pub entry_type: String,
    pub transfer_type: String,
    pub amount: i64,
    pub currency: String,
    pub balance_after: i64,
    pub occurred_at: DateTime<Utc>,
}

impl From<LedgerEntry> for MovementResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            transfer_id: entry.transfer_id,
            counterparty_account_id: entry.counterparty_account_id,
            entry_type: entry.entry_type.as_str().to_string(),
            transfer_type: entry.transfer_type.as_str().to_string(),
            amount: entry.amount,
            currency: entry.currency.as_str().to_string(),
            balance_after: entry.balance_after,
            occurred_at: entry.occurred_at,
        }
    }
}

/// Statement DTO: opening/closing snapshots plus paged movements.
#[derive(Debug, Clone, Serialize)]
pub struct StatementResponse {
    pub account_id: Uuid,
    pub currency: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub opening_balance: i64,
    pub closing_balance: i64,
    pub movements: Vec<MovementResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Paginated list DTO.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
        }
    }
}

/// Health DTO.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub services: ServiceHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_error() {
        let response = ApiResponse::success(42);
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, "{\"data\":42}");
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let response = ApiResponse::<()>::error(ErrorBody::new("ACCOUNT_NOT_FOUND", "missing"));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            "{\"error\":{\"code\":\"ACCOUNT_NOT_FOUND\",\"message\":\"missing\"}}"
        );
    }

    #[test]
    fn test_error_envelope_with_violations() {
        let body = ErrorBody {
            code: "VALIDATION_ERROR".to_string(),
            message: "request validation failed".to_string(),
            violations: Some(vec![Violation::new("amount", "must be positive")]),
        };
        let json = serde_json::to_string(&ApiResponse::<()>::error(body)).unwrap();
        assert!(json.contains("\"violations\""));
        assert!(json.contains("\"field\":\"amount\""));
    }
}
