//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::capital::LedgerError;
use crate::position::{Instrument, PositionSide};

/// Order identifier
pub type OrderId = Uuid;

/// A market entry order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRequest {
    pub instrument: Instrument,
    pub side: PositionSide,
    /// Lot-aligned quantity
    pub quantity: u32,
    /// Reference price the order was sized at
    pub price: Decimal,
    /// Carried onto the tracker (index key, direction, mode)
    pub metadata: HashMap<String, String>,
}

/// Broker acknowledgement of a filled market order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub instrument: Instrument,
    pub fill_price: Decimal,
    pub quantity: u32,
    pub timestamp: DateTime<Utc>,
}

/// Order gateway errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The broker refused the order
    #[error("Order rejected: {0}")]
    Rejected(String),
    /// Not enough balance for the order
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },
    /// Broker unreachable or timed out
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl GatewayError {
    /// Transient failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Ledger(LedgerError::Unavailable(_))
        )
    }
}
