//! Position types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a position tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Order sent, fill not yet confirmed
    Pending,
    /// Filled and monitored
    Active,
    /// Closed by an exit order
    Exited,
    /// Abandoned before or instead of a normal exit
    Cancelled,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Exited => "exited",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Option position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    LongCall,
    LongPut,
    ShortCall,
    ShortPut,
}

impl PositionSide {
    /// Long premium positions profit when the premium rises
    pub fn is_long(&self) -> bool {
        matches!(self, Self::LongCall | Self::LongPut)
    }

    /// +1 for long premium, -1 for short premium
    pub fn sign(&self) -> Decimal {
        if self.is_long() {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        }
    }
}

/// Exchange instrument identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange segment (e.g. "NSE_FNO", "BSE_FNO")
    pub exchange_segment: String,
    /// Broker security identifier
    pub security_id: String,
    /// Trading symbol
    pub symbol: String,
}

impl Instrument {
    pub fn new(
        exchange_segment: impl Into<String>,
        security_id: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            exchange_segment: exchange_segment.into(),
            security_id: security_id.into(),
            symbol: symbol.into(),
        }
    }

    /// True when both identify the same tradable contract
    pub fn same_contract(&self, segment: &str, security_id: &str) -> bool {
        self.exchange_segment == segment && self.security_id == security_id
    }
}

/// Why a position was exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    SessionEnd,
    HardStopLoss,
    TakeProfit,
    TrailingStop,
    PeakDrawdown,
    ReverseStopLoss,
    EarlyTrendFailure,
    StructureBreak,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionEnd => "session_end",
            Self::HardStopLoss => "hard_stop_loss",
            Self::TakeProfit => "take_profit",
            Self::TrailingStop => "trailing_stop",
            Self::PeakDrawdown => "peak_drawdown",
            Self::ReverseStopLoss => "reverse_stop_loss",
            Self::EarlyTrendFailure => "early_trend_failure",
            Self::StructureBreak => "structure_break",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitor-owned running marks of an active position
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionMarks {
    /// Best profit percentage seen since entry
    pub high_water_mark_pct: Decimal,
    /// Ratcheted trailing stop price
    pub trailing_stop_price: Option<Decimal>,
    /// When the position last went below its entry
    pub underwater_since: Option<DateTime<Utc>>,
}

/// A confirmed entry fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryFill {
    pub instrument: Instrument,
    pub side: PositionSide,
    pub quantity: u32,
    pub price: Decimal,
    pub metadata: std::collections::HashMap<String, String>,
    pub filled_at: DateTime<Utc>,
}

/// Illegal lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: PositionStatus,
        to: PositionStatus,
    },
}

/// Position repository errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    /// No tracker with this id
    #[error("Position not found: {0}")]
    NotFound(Uuid),
    /// Check-and-set lost: the tracker is no longer in the expected status
    #[error("Status conflict on {id}: expected {expected}, found {actual}")]
    StatusConflict {
        id: Uuid,
        expected: PositionStatus,
        actual: PositionStatus,
    },
    /// The transition itself is illegal
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Terminal trackers are immutable
    #[error("Position {0} is terminal")]
    Terminal(Uuid),
    /// A second active tracker for the same contract
    #[error("Active position already exists for {segment}/{security_id}")]
    DuplicateActive { segment: String, security_id: String },
    /// Malformed fill or tracker
    #[error("Invalid fill: {0}")]
    InvalidFill(String),
    /// Backing store unavailable
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}
