//! Domain event types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::CommandStatus;
use crate::position::ExitReason;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// Events published to notification and audit consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A position was closed by an exit order
    ExitTriggered {
        tracker_id: Uuid,
        symbol: String,
        reason: ExitReason,
        exit_price: Decimal,
        realized_pnl: Option<Decimal>,
        timestamp: DateTime<Utc>,
    },
    /// Something needs operator attention
    RiskAlert {
        severity: Severity,
        message: String,
        tracker_id: Option<Uuid>,
        command_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },
    /// A command finished an execution attempt
    CommandExecuted {
        command_id: Uuid,
        kind: String,
        status: CommandStatus,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExitTriggered { .. } => "exit_triggered",
            Self::RiskAlert { .. } => "risk_alert",
            Self::CommandExecuted { .. } => "command_executed",
        }
    }
}
