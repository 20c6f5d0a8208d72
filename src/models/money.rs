use crate::error::{DomainError, ErrorCode};
use crate::models::Currency;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount in integer minor units (cents) plus its currency.
/// Arithmetic never mixes currencies and never silently wraps or goes
/// negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    minor_units: i64,
    currency: Currency,
}

impl Money {
    pub fn new(minor_units: i64, currency: Currency) -> Result<Self, DomainError> {
        if minor_units < 0 {
            return Err(DomainError::validation("amount must not be negative"));
        }
        Ok(Self {
            minor_units,
            currency,
        })
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            minor_units: 0,
            currency,
        }
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn same_currency(&self, other: &Money) -> bool {
        self.currency == other.currency
    }

    pub fn assert_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.same_currency(other) {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::CurrencyMismatch,
                format!(
                    "cannot mix currencies {} and {}",
                    self.currency, other.currency
                ),
            ))
        }
    }

    pub fn add(&self, other: &Money) -> Result<Money, DomainError> {
        self.assert_same_currency(other)?;
        let sum = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::BalanceOverflow,
                    format!(
                        "adding {} to {} exceeds the representable balance",
                        other.minor_units, self.minor_units
                    ),
                )
            })?;
        Ok(Money {
            minor_units: sum,
            currency: self.currency.clone(),
        })
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, DomainError> {
        self.assert_same_currency(other)?;
        if other.minor_units > self.minor_units {
            return Err(DomainError::new(
                ErrorCode::InsufficientFunds,
                format!(
                    "insufficient funds: requested {}, available {}",
                    other.minor_units, self.minor_units
                ),
            ));
        }
        Ok(Money {
            minor_units: self.minor_units - other.minor_units,
            currency: self.currency.clone(),
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.minor_units, self.currency)
    }
}
