use crate::models::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Reserved identifiers used by opening-balance ledger entries. Neither
/// exists as an account or transfer row, which is why `transfer_id` carries
/// no foreign key.
pub mod bootstrap {
    use uuid::{uuid, Uuid};

    pub const COUNTERPARTY_ACCOUNT_ID: Uuid = uuid!("00000000-0000-7000-8000-000000000000");
    pub const TRANSFER_ID: Uuid = uuid!("00000000-0000-7000-8000-000000000001");
}

/// Side of a double-entry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "debit",
            EntryType::Credit => "credit",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryType::Debit),
            "credit" => Ok(EntryType::Credit),
            other => Err(format!("unknown entry type '{}'", other)),
        }
    }
}

/// The kind of money movement a ledger entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
    Transfer,
    Reversal,
    Bootstrap,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Transfer => "transfer",
            TransferType::Reversal => "reversal",
            TransferType::Bootstrap => "bootstrap",
        }
    }
}

impl FromStr for TransferType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(TransferType::Transfer),
            "reversal" => Ok(TransferType::Reversal),
            "bootstrap" => Ok(TransferType::Bootstrap),
            other => Err(format!("unknown transfer type '{}'", other)),
        }
    }
}

/// One immutable row of the append-only double-entry ledger. `balance_after`
/// is the owning account's balance immediately after this entry, denormalised
/// so statements never need a SUM().
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub counterparty_account_id: Uuid,
    pub transfer_id: Uuid,
    pub entry_type: EntryType,
    pub transfer_type: TransferType,
    pub amount: i64,
    pub currency: Currency,
    pub balance_after: i64,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn debit(
        account_id: Uuid,
        counterparty_account_id: Uuid,
        transfer_id: Uuid,
        transfer_type: TransferType,
        amount: i64,
        currency: Currency,
        balance_after: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            counterparty_account_id,
            transfer_id,
            entry_type: EntryType::Debit,
            transfer_type,
            amount,
            currency,
            balance_after,
            occurred_at,
            created_at: Utc::now(),
        }
    }

    pub fn credit(
        account_id: Uuid,
        counterparty_account_id: Uuid,
        transfer_id: Uuid,
        transfer_type: TransferType,
        amount: i64,
        currency: Currency,
        balance_after: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            counterparty_account_id,
            transfer_id,
            entry_type: EntryType::Credit,
            transfer_type,
            amount,
            currency,
            balance_after,
            occurred_at,
            created_at: Utc::now(),
        }
    }

    /// The single credit entry that seeds an account's opening balance.
    pub fn bootstrap_credit(
        account_id: Uuid,
        amount: i64,
        currency: Currency,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::credit(
            account_id,
            bootstrap::COUNTERPARTY_ACCOUNT_ID,
            bootstrap::TRANSFER_ID,
            TransferType::Bootstrap,
            amount,
            currency,
            amount,
            occurred_at,
        )
    }

    /// Signed amount from the account's perspective: credits increase the
    /// balance, debits decrease it.
    pub fn signed_amount(&self) -> i64 {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::uuid;

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    #[test]
    fn test_bootstrap_ids_are_reserved() {
        assert_eq!(
            bootstrap::COUNTERPARTY_ACCOUNT_ID,
            uuid!("00000000-0000-7000-8000-000000000000")
        );
        assert_eq!(
            bootstrap::TRANSFER_ID,
            uuid!("00000000-0000-7000-8000-000000000001")
        );
        assert_ne!(bootstrap::COUNTERPARTY_ACCOUNT_ID, bootstrap::TRANSFER_ID);
    }

    #[test]
    fn test_debit_entry() {
        let account = Uuid::new_v4();
        let counterparty = Uuid::new_v4();
        let transfer = Uuid::now_v7();
        let entry = LedgerEntry::debit(
            account,
            counterparty,
            transfer,
            TransferType::Transfer,
            2_500,
            usd(),
            7_500,
            Utc::now(),
        );

        assert_eq!(entry.entry_type, EntryType::Debit);
        assert_eq!(entry.amount, 2_500);
        assert_eq!(entry.balance_after, 7_500);
        assert_eq!(entry.signed_amount(), -2_500);
    }

    #[test]
    fn test_credit_entry() {
        let entry = LedgerEntry::credit(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::now_v7(),
            TransferType::Transfer,
            2_500,
            usd(),
            2_500,
            Utc::now(),
        );

        assert_eq!(entry.entry_type, EntryType::Credit);
        assert_eq!(entry.signed_amount(), 2_500);
    }

    #[test]
    fn test_bootstrap_credit() {
        let account = Uuid::new_v4();
        let entry = LedgerEntry::bootstrap_credit(account, 10_000, usd(), Utc::now());

        assert_eq!(entry.account_id, account);
        assert_eq!(entry.counterparty_account_id, bootstrap::COUNTERPARTY_ACCOUNT_ID);
        assert_eq!(entry.transfer_id, bootstrap::TRANSFER_ID);
        assert_eq!(entry.transfer_type, TransferType::Bootstrap);
        assert_eq!(entry.entry_type, EntryType::Credit);
        assert_eq!(entry.amount, 10_000);
        assert_eq!(entry.balance_after, 10_000);
    }

    #[test]
    fn test_entry_type_round_trip() {
        assert_eq!("debit".parse::<EntryType>().unwrap(), EntryType::Debit);
        assert_eq!("credit".parse::<EntryType>().unwrap(), EntryType::Credit);
        assert!("refund".parse::<EntryType>().is_err());
        assert_eq!(EntryType::Debit.opposite(), EntryType::Credit);
    }

    #[test]
    fn test_transfer_type_round_trip() {
        for kind in [
            TransferType::Transfer,
            TransferType::Reversal,
            TransferType::Bootstrap,
        ] {
            assert_eq!(kind.as_str().parse::<TransferType>().unwrap(), kind);
        }
        assert!("payment".parse::<TransferType>().is_err());
    }

    #[test]
    fn test_ledger_ids_are_time_ordered() {
        let a = LedgerEntry::bootstrap_credit(Uuid::new_v4(), 1, usd(), Utc::now());
        let b = LedgerEntry::bootstrap_credit(Uuid::new_v4(), 1, usd(), Utc::now());
        assert!(a.id <= b.id);
    }
}
