//! Position tracker record

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{EntryFill, ExitReason, Instrument, PositionMarks, PositionSide, PositionStatus};

/// Metadata key holding the underlying index (NIFTY, BANKNIFTY, ...)
pub const META_INDEX_KEY: &str = "index_key";
/// Metadata key holding the trade direction from the signal layer
pub const META_DIRECTION: &str = "direction";
/// Metadata key holding "paper" or "live"
pub const META_MODE: &str = "mode";

/// One open or closed derivative position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionTracker {
    pub id: Uuid,
    pub instrument: Instrument,
    pub side: PositionSide,
    /// Lot-aligned quantity
    pub quantity: u32,
    /// First fill price
    pub entry_price: Decimal,
    /// Quantity-weighted average of all fills
    pub average_price: Decimal,
    pub status: PositionStatus,
    /// Best profit percentage seen; never decreases
    pub high_water_mark_pct: Decimal,
    pub trailing_stop_price: Option<Decimal>,
    pub underwater_since: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<Decimal>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
}

impl PositionTracker {
    /// Create a pending tracker from an entry fill
    pub fn pending(fill: EntryFill) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: fill.instrument,
            side: fill.side,
            quantity: fill.quantity,
            entry_price: fill.price,
            average_price: fill.price,
            status: PositionStatus::Pending,
            high_water_mark_pct: dec!(0),
            trailing_stop_price: None,
            underwater_since: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: None,
            metadata: fill.metadata,
            created_at: fill.filled_at,
            updated_at: fill.filled_at,
            exited_at: None,
        }
    }

    /// Unrealized profit as a percentage of the average price
    pub fn profit_pct(&self, ltp: Decimal) -> Decimal {
        if self.average_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.side.sign() * (ltp - self.average_price) / self.average_price * dec!(100)
    }

    /// P&L if the whole quantity were closed at `price`
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        self.side.sign() * (price - self.average_price) * Decimal::from(self.quantity)
    }

    /// Capital committed at entry
    pub fn entry_cost(&self) -> Decimal {
        self.average_price * Decimal::from(self.quantity)
    }

    /// Average a second fill into this tracker
    ///
    /// The average price is quantity-weighted; the first entry price is kept.
    pub fn average_in(&mut self, quantity: u32, price: Decimal, at: DateTime<Utc>) {
        let old_qty = Decimal::from(self.quantity);
        let add_qty = Decimal::from(quantity);
        let total = old_qty + add_qty;
        if total > Decimal::ZERO {
            self.average_price = (self.average_price * old_qty + price * add_qty) / total;
        }
        self.quantity += quantity;
        self.updated_at = at;
    }

    /// Apply monitor marks; the high-water mark only moves up
    pub fn apply_marks(&mut self, marks: &PositionMarks, at: DateTime<Utc>) {
        self.high_water_mark_pct = self.high_water_mark_pct.max(marks.high_water_mark_pct);
        self.trailing_stop_price = marks.trailing_stop_price;
        self.underwater_since = marks.underwater_since;
        self.updated_at = at;
    }

    /// Record exit details; status is set separately by the repository
    pub fn record_exit(&mut self, price: Decimal, reason: ExitReason, at: DateTime<Utc>) {
        self.exit_price = Some(price);
        self.exit_reason = Some(reason);
        self.realized_pnl = Some(self.pnl_at(price));
        self.exited_at = Some(at);
        self.updated_at = at;
    }

    /// Current marks
    pub fn marks(&self) -> PositionMarks {
        PositionMarks {
            high_water_mark_pct: self.high_water_mark_pct,
            trailing_stop_price: self.trailing_stop_price,
            underwater_since: self.underwater_since,
        }
    }

    pub fn index_key(&self) -> Option<&str> {
        self.metadata.get(META_INDEX_KEY).map(String::as_str)
    }

    pub fn is_paper(&self) -> bool {
        self.metadata
            .get(META_MODE)
            .map(|m| m == "paper")
            .unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn fill(side: PositionSide, quantity: u32, price: Decimal) -> EntryFill {
        let mut metadata = HashMap::new();
        metadata.insert(META_INDEX_KEY.to_string(), "NIFTY".to_string());
        metadata.insert(META_MODE.to_string(), "paper".to_string());
        EntryFill {
            instrument: Instrument::new("NSE_FNO", "43210", "NIFTY24500CE"),
            side,
            quantity,
            price,
            metadata,
            filled_at: Utc::now(),
        }
    }

    pub fn active(side: PositionSide, quantity: u32, price: Decimal) -> PositionTracker {
        let mut tracker = PositionTracker::pending(fill(side, quantity, price));
        tracker.status = PositionStatus::Active;
        tracker
    }
}
