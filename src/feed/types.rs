//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A last-traded-price tick for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    /// Exchange segment (e.g. "NSE_FNO")
    pub exchange_segment: String,
    /// Broker security identifier
    pub security_id: String,
    /// Last traded price
    pub ltp: Decimal,
    /// Local timestamp when tick was received
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(
        exchange_segment: impl Into<String>,
        security_id: impl Into<String>,
        ltp: Decimal,
    ) -> Self {
        Self {
            exchange_segment: exchange_segment.into(),
            security_id: security_id.into(),
            ltp,
            timestamp: Utc::now(),
        }
    }
}
