use crate::error::{DomainError, ErrorCode};
use crate::models::{Currency, DomainEvent, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a transfer. `Processing` is ephemeral: it exists only
/// in memory between the initiate and the terminal transition, and is never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Processing => "processing",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Reversed => "reversed",
        }
    }

    /// The only legal transitions of the state machine.
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Processing)
                | (TransferStatus::Processing, TransferStatus::Completed)
                | (TransferStatus::Processing, TransferStatus::Failed)
                | (TransferStatus::Completed, TransferStatus::Reversed)
        )
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "processing" => Ok(TransferStatus::Processing),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            "reversed" => Ok(TransferStatus::Reversed),
            other => Err(format!("unknown transfer status '{}'", other)),
        }
    }
}

/// The transfer aggregate: a single money movement between two accounts,
/// identified by a time-ordered UUID so B-tree insertion stays append-mostly.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: Uuid,
    pub reference: String,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    pub status: TransferStatus,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub version: i64,
    events: Vec<DomainEvent>,
}

/// Human reference: TXN-YYYYMMDD-XXXXXXXXXXXX, with the suffix taken from
/// the last 12 upper-hex characters of the id without dashes. Deterministic
/// for a given (id, created_at).
pub fn generate_reference(id: Uuid, created_at: DateTime<Utc>) -> String {
    let hex = id.simple().to_string().to_uppercase();
    let suffix = &hex[hex.len() - 12..];
    format!("TXN-{}-{}", created_at.format("%Y%m%d"), suffix)
}

impl Transfer {
    /// Factory path: validates the command and raises TransferInitiated.
    pub fn initiate(
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: &Money,
        description: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Self, DomainError> {
        if source_account_id == destination_account_id {
            return Err(DomainError::new(
                ErrorCode::SameAccountTransfer,
                "source and destination accounts must differ",
            ));
        }
        if amount.minor_units() <= 0 {
            return Err(DomainError::new(
                ErrorCode::InvalidTransferAmount,
                "transfer amount must be positive",
            ));
        }
        if let Some(description) = &description {
            if description.len() > 500 {
                return Err(DomainError::validation(
                    "description must not exceed 500 characters",
                ));
            }
        }
        if let Some(key) = &idempotency_key {
            if key.is_empty() || key.len() > 255 {
                return Err(DomainError::new(
                    ErrorCode::InvalidIdempotencyKey,
                    "idempotency key must be 1-255 characters",
                ));
            }
        }

        let id = Uuid::now_v7();
        let now = Utc::now();
        let reference = generate_reference(id, now);
        let mut transfer = Self {
            id,
            reference: reference.clone(),
            source_account_id,
            destination_account_id,
            amount: amount.minor_units(),
            currency: amount.currency().clone(),
            description,
            idempotency_key,
            status: TransferStatus::Pending,
            failure_code: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            reversed_at: None,
            version: 0,
            events: Vec::new(),
        };
        transfer.events.push(DomainEvent::TransferInitiated {
            transfer_id: transfer.id,
            reference,
            source_account_id,
            destination_account_id,
            amount: transfer.amount,
            currency: transfer.currency.as_str().to_string(),
        });
        Ok(transfer)
    }

    /// Hydration path used exclusively by persistence. Raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: Uuid,
        reference: String,
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: i64,
        currency: Currency,
        description: Option<String>,
        idempotency_key: Option<String>,
        status: TransferStatus,
        failure_code: Option<String>,
        failure_reason: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        failed_at: Option<DateTime<Utc>>,
        reversed_at: Option<DateTime<Utc>>,
        version: i64,
    ) -> Self {
        Self {
            id,
            reference,
            source_account_id,
            destination_account_id,
            amount,
            currency,
            description,
            idempotency_key,
            status,
            failure_code,
            failure_reason,
            created_at,
            updated_at,
            completed_at,
            failed_at,
            reversed_at,
            version,
            events: Vec::new(),
        }
    }

    pub fn amount_money(&self) -> Result<Money, DomainError> {
        Money::new(self.amount, self.currency.clone())
    }

    /// One clock read per transition: the returned timestamp is both the new
    /// `updated_at` and the terminal-state timestamp.
    fn transition(&mut self, next: TransferStatus) -> Result<DateTime<Utc>, DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::new(
                ErrorCode::InvalidTransferState,
                format!(
                    "transfer '{}' cannot transition from '{}' to '{}'",
                    self.id,
                    self.status.as_str(),
                    next.as_str()
                ),
            ));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        self.version += 1;
        Ok(now)
    }

    pub fn mark_processing(&mut self) -> Result<(), DomainError> {
        self.transition(TransferStatus::Processing)?;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        let now = self.transition(TransferStatus::Completed)?;
        self.completed_at = Some(now);
        self.events.push(DomainEvent::TransferCompleted {
            transfer_id: self.id,
            reference: self.reference.clone(),
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            amount: self.amount,
            currency: self.currency.as_str().to_string(),
            completed_at: now,
        });
        Ok(())
    }

    pub fn fail(&mut self, code: &str, reason: &str) -> Result<(), DomainError> {
        let now = self.transition(TransferStatus::Failed)?;
        self.failed_at = Some(now);
        self.failure_code = Some(code.chars().take(100).collect());
        self.failure_reason = Some(reason.chars().take(500).collect());
        self.events.push(DomainEvent::TransferFailed {
            transfer_id: self.id,
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            failure_code: self.failure_code.clone().unwrap_or_default(),
            failure_reason: self.failure_reason.clone().unwrap_or_default(),
        });
        Ok(())
    }

    pub fn reverse(&mut self) -> Result<(), DomainError> {
        let now = self.transition(TransferStatus::Reversed)?;
        self.reversed_at = Some(now);
        self.events.push(DomainEvent::TransferReversed {
            transfer_id: self.id,
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            amount: self.amount,
            currency: self.currency.as_str().to_string(),
            reversed_at: now,
        });
        Ok(())
    }

    pub fn peek_events(&self) -> &[DomainEvent] {
        &self.events
    }

    pub fn release_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}
