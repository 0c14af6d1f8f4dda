//! Risk management types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::position::{ExitReason, PositionMarks};

/// Qualitative inputs from the signal layer for one tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitSignals {
    /// Current ATR divided by recent ATR; below 1.0 means momentum is fading
    pub atr_ratio: Option<Decimal>,
    /// The move that justified the entry has failed to follow through
    pub early_trend_failure: bool,
    /// Price broke the market structure the entry relied on
    pub structure_break: bool,
}

/// Result of one exit evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub should_exit: bool,
    pub reason: Option<ExitReason>,
    /// Price the decision was made at, if one was available
    pub reference_price: Option<Decimal>,
    /// Current unrealized profit, if a price was available
    pub profit_pct: Option<Decimal>,
    /// Updated marks to persist before any exit is dispatched
    pub marks: PositionMarks,
    pub allowed_drawdown: Option<Decimal>,
    pub reverse_stop: Option<Decimal>,
}

impl ExitDecision {
    /// Keep the tracker open with the given marks
    pub fn hold(marks: PositionMarks) -> Self {
        Self {
            should_exit: false,
            reason: None,
            reference_price: None,
            profit_pct: None,
            marks,
            allowed_drawdown: None,
            reverse_stop: None,
        }
    }

    pub(crate) fn with_exit(mut self, reason: ExitReason) -> Self {
        self.should_exit = true;
        self.reason = Some(reason);
        self
    }
}

/// Outcome of a halt gate check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeGate {
    pub allowed: bool,
    pub reason: GateReason,
}

impl TradeGate {
    pub fn allow(reason: GateReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub fn deny(reason: GateReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Why the halt gate allowed or denied trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// Gate disabled in configuration
    Disabled,
    /// Realized profit is below the protection threshold
    BelowThreshold,
    /// Above threshold but the signal is confident enough
    HighConfidence,
    /// Above threshold and the signal is missing or not confident enough
    ProfitProtection,
    /// Realized P&L or capital could not be read; trading continues
    FailOpen,
}

/// Snapshot of the circuit breaker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub tripped: bool,
    pub reason: Option<String>,
    pub tripped_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}
