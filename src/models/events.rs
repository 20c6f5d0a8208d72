use crate::models::TransferType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events raised by the aggregates. They accumulate on the aggregate's
/// in-memory buffer, are written to the outbox inside the business
/// transaction (peek) and dispatched in-process after commit (release).
///
/// Every event carries enough payload that downstream consumers never need
/// to reload the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    AccountCreated {
        account_id: Uuid,
        owner_name: String,
        currency: String,
        initial_balance: i64,
    },
    AccountDebited {
        account_id: Uuid,
        counterparty_account_id: Uuid,
        transfer_id: Uuid,
        transfer_type: TransferType,
        amount: i64,
        currency: String,
        balance_after: i64,
    },
    AccountCredited {
        account_id: Uuid,
        counterparty_account_id: Uuid,
        transfer_id: Uuid,
        transfer_type: TransferType,
        amount: i64,
        currency: String,
        balance_after: i64,
    },
    AccountFrozen {
        account_id: Uuid,
    },
    AccountUnfrozen {
        account_id: Uuid,
    },
    AccountClosed {
        account_id: Uuid,
        closed_at: DateTime<Utc>,
    },
    TransferInitiated {
        transfer_id: Uuid,
        reference: String,
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: i64,
        currency: String,
    },
    TransferCompleted {
        transfer_id: Uuid,
        reference: String,
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: i64,
        currency: String,
        completed_at: DateTime<Utc>,
    },
    TransferFailed {
        transfer_id: Uuid,
        source_account_id: Uuid,
        destination_account_id: Uuid,
        failure_code: String,
        failure_reason: String,
    },
    TransferReversed {
        transfer_id: Uuid,
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: i64,
        currency: String,
        reversed_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Fully-qualified logical event name, stored on the outbox row.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AccountCreated { .. } => "account.created",
            DomainEvent::AccountDebited { .. } => "account.debited",
            DomainEvent::AccountCredited { .. } => "account.credited",
            DomainEvent::AccountFrozen { .. } => "account.frozen",
            DomainEvent::AccountUnfrozen { .. } => "account.unfrozen",
            DomainEvent::AccountClosed { .. } => "account.closed",
            DomainEvent::TransferInitiated { .. } => "transfer.initiated",
            DomainEvent::TransferCompleted { .. } => "transfer.completed",
            DomainEvent::TransferFailed { .. } => "transfer.failed",
            DomainEvent::TransferReversed { .. } => "transfer.reversed",
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::AccountCreated { .. }
            | DomainEvent::AccountDebited { .. }
            | DomainEvent::AccountCredited { .. }
            | DomainEvent::AccountFrozen { .. }
            | DomainEvent::AccountUnfrozen { .. }
            | DomainEvent::AccountClosed { .. } => "account",
            DomainEvent::TransferInitiated { .. }
            | DomainEvent::TransferCompleted { .. }
            | DomainEvent::TransferFailed { .. }
            | DomainEvent::TransferReversed { .. } => "transfer",
        }
    }
}

/// An event paired with the id of the aggregate that raised it, so the
/// transfer handler can route account events to the outbox without importing
/// account internals.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub aggregate_id: Uuid,
    pub event: DomainEvent,
}

impl TaggedEvent {
    pub fn new(aggregate_id: Uuid, event: DomainEvent) -> Self {
        Self {
            aggregate_id,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_events() -> Vec<DomainEvent> {
        let account = Uuid::new_v4();
        let counterparty = Uuid::new_v4();
        let transfer = Uuid::now_v7();
        let now = Utc::now();
        vec![
            DomainEvent::AccountCreated {
                account_id: account,
                owner_name: "Ada Lovelace".to_string(),
                currency: "USD".to_string(),
                initial_balance: 10_000,
            },
            DomainEvent::AccountDebited {
                account_id: account,
                counterparty_account_id: counterparty,
                transfer_id: transfer,
                transfer_type: TransferType::Transfer,
                amount: 2_500,
                currency: "USD".to_string(),
                balance_after: 7_500,
            },
            DomainEvent::AccountCredited {
                account_id: counterparty,
                counterparty_account_id: account,
                transfer_id: transfer,
                transfer_type: TransferType::Transfer,
                amount: 2_500,
                currency: "USD".to_string(),
                balance_after: 2_500,
            },
            DomainEvent::AccountFrozen {
                account_id: account,
            },
            DomainEvent::AccountUnfrozen {
                account_id: account,
            },
            DomainEvent::AccountClosed {
                account_id: account,
                closed_at: now,
            },
            DomainEvent::TransferInitiated {
                transfer_id: transfer,
                reference: "TXN-20260101-AABBCCDDEEFF".to_string(),
                source_account_id: account,
                destination_account_id: counterparty,
                amount: 2_500,
                currency: "USD".to_string(),
            },
            DomainEvent::TransferCompleted {
                transfer_id: transfer,
                reference: "TXN-20260101-AABBCCDDEEFF".to_string(),
                source_account_id: account,
                destination_account_id: counterparty,
                amount: 2_500,
                currency: "USD".to_string(),
                completed_at: now,
            },
            DomainEvent::TransferFailed {
                transfer_id: transfer,
                source_account_id: account,
                destination_account_id: counterparty,
                failure_code: "INSUFFICIENT_FUNDS".to_string(),
                failure_reason: "insufficient funds: requested 500, available 100".to_string(),
            },
            DomainEvent::TransferReversed {
                transfer_id: transfer,
                source_account_id: account,
                destination_account_id: counterparty,
                amount: 2_500,
                currency: "USD".to_string(),
                reversed_at: now,
            },
        ]
    }

    #[test]
    fn test_every_event_kind_round_trips() {
        for event in sample_events() {
            let json = serde_json::to_string(&event).unwrap();
            let back: DomainEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn test_event_types_are_fully_qualified() {
        for event in sample_events() {
            let name = event.event_type();
            assert!(name.starts_with("account.") || name.starts_with("transfer."));
            assert!(name.starts_with(event.aggregate_type()));
        }
    }

    #[test]
    fn test_tagged_event_carries_aggregate_id() {
        let id = Uuid::new_v4();
        let tagged = TaggedEvent::new(id, DomainEvent::AccountFrozen { account_id: id });
        assert_eq!(tagged.aggregate_id, id);
        assert_eq!(tagged.event.aggregate_type(), "account");
    }
}
