//! Command framework types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a tracked command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Undoing,
    Undone,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Undoing => "undoing",
            Self::Undone => "undone",
        }
    }

    /// Legal command status edges
    ///
    /// `failed -> pending` is only taken by a retry; `undoing -> completed`
    /// is a failed undo.
    pub fn can_transition_to(self, to: CommandStatus) -> bool {
        use self::CommandStatus::*;
        matches!(
            (self, to),
            (Pending, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Completed, Undoing)
                | (Undoing, Undone)
                | (Undoing, Completed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one command instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub kind: String,
    pub status: CommandStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl CommandRecord {
    pub fn new(kind: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            status: CommandStatus::Pending,
            retry_count: 0,
            error: None,
            created_at: Utc::now(),
            executed_at: None,
            metadata,
        }
    }
}

/// Append-only record of one command status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub command_id: Uuid,
    pub kind: String,
    pub from: CommandStatus,
    pub to: CommandStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Category of a command failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Preconditions not met; retrying cannot help
    Validation,
    /// The side effect failed
    Execution,
    /// The side effect did not finish in time
    Timeout,
}

/// Why a command's execution or undo failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct CommandFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CommandFailure {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Validation,
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Execution,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, FailureKind::Execution | FailureKind::Timeout)
    }
}

/// Command executor errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Only pending commands can execute
    #[error("Command {id} already executed (status {status})")]
    AlreadyExecuted { id: Uuid, status: CommandStatus },
    #[error("Max retries exceeded ({max})")]
    MaxRetriesExceeded { max: u32 },
    #[error("Command {0} is not undoable")]
    NotUndoable(String),
    #[error("Cannot {operation} command in status {status}")]
    InvalidState {
        status: CommandStatus,
        operation: &'static str,
    },
    #[error("Command failed: {0}")]
    Failed(#[from] CommandFailure),
}

/// Audit log errors
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::CommandStatus::*;

    #[test]
    fn test_status_edges() {
        assert!(Pending.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Undoing.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Undone.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Executing));
    }

    #[test]
    fn test_failure_retryability() {
        assert!(!CommandFailure::validation("bad").is_retryable());
        assert!(CommandFailure::execution("broker down").is_retryable());
        assert!(CommandFailure::timeout("slow").is_retryable());
    }

    #[test]
    fn test_failure_message() {
        let failure = CommandFailure::timeout("gateway call exceeded 5000ms");
        assert_eq!(failure.to_string(), "Timeout: gateway call exceeded 5000ms");
    }
}
