//! Command module
//!
//! Side-effecting operations wrapped in tracked, audited, retryable commands

mod audit;
mod executor;
mod exit;
mod place;
mod types;

#[cfg(test)]
pub(crate) mod testkit;

pub use audit::{AuditLog, InMemoryAuditLog, JsonlAuditLog};
pub use executor::CommandExecutor;
pub use exit::{ExitOutcome, ExitPositionCommand};
pub use place::{EntryGuards, PlaceOrderCommand, PlaceOutcome};
pub use types::{
    AuditEntry, AuditError, CommandError, CommandFailure, CommandRecord, CommandStatus,
    FailureKind,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::events::EventSink;
use crate::execution::{GatewayError, OrderGateway};
use crate::feed::PriceSource;
use crate::position::{ExitClaims, PositionRepository};

/// A side-effecting operation run by the [`CommandExecutor`]
#[async_trait]
pub trait Command: Send + Sync {
    /// Result of a successful execution, kept for undo
    type Output: Clone + Send + Sync;

    /// Stable command kind, used in audit entries and metrics
    fn name(&self) -> &'static str;

    fn undoable(&self) -> bool {
        false
    }

    /// Context copied onto the command record
    fn metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    async fn perform_execution(&self) -> Result<Self::Output, CommandFailure>;

    async fn perform_undo(&self, _output: &Self::Output) -> Result<(), CommandFailure> {
        Err(CommandFailure::validation(format!(
            "{} does not support undo",
            self.name()
        )))
    }
}

/// A command together with its execution record
pub struct TrackedCommand<C: Command> {
    pub record: CommandRecord,
    pub command: C,
    output: Option<C::Output>,
}

impl<C: Command> TrackedCommand<C> {
    pub fn new(command: C) -> Self {
        Self {
            record: CommandRecord::new(command.name(), command.metadata()),
            command,
            output: None,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.record.id
    }

    pub fn status(&self) -> CommandStatus {
        self.record.status
    }

    /// Output of the last successful execution
    pub fn output(&self) -> Option<&C::Output> {
        self.output.as_ref()
    }

    pub(crate) fn set_output(&mut self, output: Option<C::Output>) {
        self.output = output;
    }
}

/// Shared services commands act through
#[derive(Clone)]
pub struct CommandContext {
    pub repository: Arc<dyn PositionRepository>,
    pub prices: Arc<dyn PriceSource>,
    pub gateway: Arc<dyn OrderGateway>,
    pub events: Arc<dyn EventSink>,
    pub claims: ExitClaims,
}

/// Transient gateway errors may be retried; the rest are final
pub(crate) fn gateway_failure(error: GatewayError) -> CommandFailure {
    if error.is_retryable() {
        CommandFailure::execution(error.to_string())
    } else {
        CommandFailure::validation(error.to_string())
    }
}
