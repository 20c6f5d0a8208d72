use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error codes exposed on the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidJson,
    UnsupportedMediaType,
    RateLimitExceeded,
    IdempotencyKeyRequired,
    InvalidIdempotencyKey,
    IdempotencyKeyReuse,
    IdempotencyLockTimeout,
    TransferNotFound,
    InvalidTransferState,
    InvalidTransferAmount,
    SameAccountTransfer,
    AccountNotFound,
    AccountFrozen,
    AccountClosed,
    InvalidAccountState,
    NonZeroBalanceOnClose,
    InsufficientFunds,
    CurrencyMismatch,
    BalanceOverflow,
    InvalidDateRange,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::IdempotencyKeyRequired => "IDEMPOTENCY_KEY_REQUIRED",
            ErrorCode::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            ErrorCode::IdempotencyKeyReuse => "IDEMPOTENCY_KEY_REUSE",
            ErrorCode::IdempotencyLockTimeout => "IDEMPOTENCY_LOCK_TIMEOUT",
            ErrorCode::TransferNotFound => "TRANSFER_NOT_FOUND",
            ErrorCode::InvalidTransferState => "INVALID_TRANSFER_STATE",
            ErrorCode::InvalidTransferAmount => "INVALID_TRANSFER_AMOUNT",
            ErrorCode::SameAccountTransfer => "SAME_ACCOUNT_TRANSFER",
            ErrorCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorCode::AccountFrozen => "ACCOUNT_FROZEN",
            ErrorCode::AccountClosed => "ACCOUNT_CLOSED",
            ErrorCode::InvalidAccountState => "INVALID_ACCOUNT_STATE",
            ErrorCode::NonZeroBalanceOnClose => "NON_ZERO_BALANCE_ON_CLOSE",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::CurrencyMismatch => "CURRENCY_MISMATCH",
            ErrorCode::BalanceOverflow => "BALANCE_OVERFLOW",
            ErrorCode::InvalidDateRange => "INVALID_DATE_RANGE",
        }
    }

    /// Fixed code-to-status table. Codes not listed here default to 422.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AccountNotFound | ErrorCode::TransferNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AccountFrozen
            | ErrorCode::AccountClosed
            | ErrorCode::InvalidAccountState
            | ErrorCode::InvalidTransferState
            | ErrorCode::NonZeroBalanceOnClose => StatusCode::CONFLICT,
            ErrorCode::ValidationError
            | ErrorCode::InvalidJson
            | ErrorCode::IdempotencyKeyRequired => StatusCode::BAD_REQUEST,
            ErrorCode::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::IdempotencyLockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field-level validation failure, reported under `error.violations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An error raised by an aggregate or use-case, carrying a machine code.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub violations: Option<Vec<Violation>>,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            violations: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = Some(violations);
        self
    }
}

/// Top-level error type. Domain errors carry a code that the HTTP layer maps
/// through the fixed table; infrastructure errors surface as 500.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn domain(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Domain(DomainError::new(code, message))
    }

    /// The machine code when this is a domain error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Domain(err) => Some(err.code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
