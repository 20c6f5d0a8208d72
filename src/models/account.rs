use crate::error::{DomainError, ErrorCode};
use crate::models::{Currency, DomainEvent, Money, TransferType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Operational state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    /// Terminal. A closed account never transitions again.
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}

/// The account aggregate. Balance is integer minor units in the account's
/// declared currency and never goes negative. All mutation goes through the
/// debit/credit/freeze/unfreeze/close operations, each of which bumps the
/// version and buffers a domain event.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub owner_name: String,
    pub currency: Currency,
    pub balance: i64,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: i64,
    events: Vec<DomainEvent>,
}

impl Account {
    /// Factory path: validates inputs and raises AccountCreated.
    pub fn open(
        id: Uuid,
        owner_name: &str,
        currency: Currency,
        initial_balance: i64,
    ) -> Result<Self, DomainError> {
        let owner_name = owner_name.trim();
        if owner_name.is_empty() {
            return Err(DomainError::validation("owner name must not be blank"));
        }
        if owner_name.len() > 255 {
            return Err(DomainError::validation(
                "owner name must not exceed 255 characters",
            ));
        }
        if initial_balance < 0 {
            return Err(DomainError::validation(
                "initial balance must not be negative",
            ));
        }

        let now = Utc::now();
        let mut account = Self {
            id,
            owner_name: owner_name.to_string(),
            currency: currency.clone(),
            balance: initial_balance,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
            closed_at: None,
            version: 0,
            events: Vec::new(),
        };
        account.events.push(DomainEvent::AccountCreated {
            account_id: account.id,
            owner_name: account.owner_name.clone(),
            currency: currency.as_str().to_string(),
            initial_balance,
        });
        Ok(account)
    }

    /// Hydration path used exclusively by persistence. Raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: Uuid,
        owner_name: String,
        currency: Currency,
        balance: i64,
        status: AccountStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        closed_at: Option<DateTime<Utc>>,
        version: i64,
    ) -> Self {
        Self {
            id,
            owner_name,
            currency,
            balance,
            status,
            created_at,
            updated_at,
            closed_at,
            version,
            events: Vec::new(),
        }
    }

    fn assert_active(&self) -> Result<(), DomainError> {
        match self.status {
            AccountStatus::Active => Ok(()),
            AccountStatus::Frozen => Err(DomainError::new(
                ErrorCode::AccountFrozen,
                format!("account '{}' is frozen", self.id),
            )),
            AccountStatus::Closed => Err(DomainError::new(
                ErrorCode::AccountClosed,
                format!("account '{}' is closed", self.id),
            )),
        }
    }

    fn assert_currency(&self, amount: &Money) -> Result<(), DomainError> {
        if amount.currency() == &self.currency {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::CurrencyMismatch,
                format!(
                    "account '{}' holds {}, got {}",
                    self.id,
                    self.currency,
                    amount.currency()
                ),
            ))
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn debit(
        &mut self,
        amount: &Money,
        transfer_id: Uuid,
        transfer_type: TransferType,
        counterparty_account_id: Uuid,
    ) -> Result<(), DomainError> {
        self.assert_active()?;
        self.assert_currency(amount)?;
        let current = Money::new(self.balance, self.currency.clone())?;
        let remaining = current.subtract(amount)?;
        self.balance = remaining.minor_units();
        self.touch();
        self.events.push(DomainEvent::AccountDebited {
            account_id: self.id,
            counterparty_account_id,
            transfer_id,
            transfer_type,
            amount: amount.minor_units(),
            currency: self.currency.as_str().to_string(),
            balance_after: self.balance,
        });
        Ok(())
    }

    pub fn credit(
        &mut self,
        amount: &Money,
        transfer_id: Uuid,
        transfer_type: TransferType,
        counterparty_account_id: Uuid,
    ) -> Result<(), DomainError> {
        self.assert_active()?;
        self.assert_currency(amount)?;
        let current = Money::new(self.balance, self.currency.clone())?;
        let updated = current.add(amount)?;
        self.balance = updated.minor_units();
        self.touch();
        self.events.push(DomainEvent::AccountCredited {
            account_id: self.id,
            counterparty_account_id,
            transfer_id,
            transfer_type,
            amount: amount.minor_units(),
            currency: self.currency.as_str().to_string(),
            balance_after: self.balance,
        });
        Ok(())
    }

    pub fn freeze(&mut self) -> Result<(), DomainError> {
        if self.status != AccountStatus::Active {
            return Err(DomainError::new(
                ErrorCode::InvalidAccountState,
                format!(
                    "cannot freeze account '{}' in status '{}'",
                    self.id,
                    self.status.as_str()
                ),
            ));
        }
        self.status = AccountStatus::Frozen;
        self.touch();
        self.events.push(DomainEvent::AccountFrozen {
            account_id: self.id,
        });
        Ok(())
    }

    pub fn unfreeze(&mut self) -> Result<(), DomainError> {
        if self.status != AccountStatus::Frozen {
            return Err(DomainError::new(
                ErrorCode::InvalidAccountState,
                format!(
                    "cannot unfreeze account '{}' in status '{}'",
                    self.id,
                    self.status.as_str()
                ),
            ));
        }
        self.status = AccountStatus::Active;
        self.touch();
        self.events.push(DomainEvent::AccountUnfrozen {
            account_id: self.id,
        });
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Closed {
            return Err(DomainError::new(
                ErrorCode::InvalidAccountState,
                format!("account '{}' is already closed", self.id),
            ));
        }
        if self.balance != 0 {
            return Err(DomainError::new(
                ErrorCode::NonZeroBalanceOnClose,
                format!(
                    "cannot close account '{}' with balance {}",
                    self.id, self.balance
                ),
            ));
        }
        self.status = AccountStatus::Closed;
        self.touch();
        self.closed_at = Some(self.updated_at);
        self.events.push(DomainEvent::AccountClosed {
            account_id: self.id,
            closed_at: self.updated_at,
        });
        Ok(())
    }

    /// Returns buffered events without clearing them. Used inside the
    /// transaction to write the outbox before commit.
    pub fn peek_events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Returns and clears buffered events. Used after commit for in-process
    /// dispatch.
    pub fn release_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}
