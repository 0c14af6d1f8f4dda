//! Capital and ledger types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Paper balance for one trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub day: NaiveDate,
    /// Balance the day started from
    pub initial_balance: Decimal,
    /// Current balance; never negative
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn open(day: NaiveDate, initial_balance: Decimal) -> Self {
        let initial_balance = initial_balance.max(Decimal::ZERO);
        Self {
            day,
            initial_balance,
            balance: initial_balance,
            updated_at: Utc::now(),
        }
    }
}

/// Balance ledger errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Debits and credits take non-negative amounts
    #[error("Negative ledger amount: {0}")]
    NegativeAmount(Decimal),
    /// A checked debit larger than the balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
    /// Backing store unavailable
    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),
}
