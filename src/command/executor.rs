//! Command executor
//!
//! Drives tracked commands through their status machine. Every status
//! change is appended to the audit log; every execution outcome is published
//! as a `command_executed` event. Audit failures are logged and never fail
//! the command.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::audit::AuditLog;
use super::types::{AuditEntry, CommandError, CommandFailure, CommandStatus};
use super::{Command, TrackedCommand};
use crate::config::ExecutorConfig;
use crate::events::{DomainEvent, EventSink, Severity};
use crate::telemetry;

/// Executes, retries and undoes commands
pub struct CommandExecutor {
    audit: Arc<dyn AuditLog>,
    events: Arc<dyn EventSink>,
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(audit: Arc<dyn AuditLog>, events: Arc<dyn EventSink>, config: ExecutorConfig) -> Self {
        Self {
            audit,
            events,
            config,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Run a pending command once
    pub async fn execute<C: Command>(
        &self,
        cmd: &mut TrackedCommand<C>,
    ) -> Result<C::Output, CommandError> {
        if cmd.record.status != CommandStatus::Pending {
            return Err(CommandError::AlreadyExecuted {
                id: cmd.record.id,
                status: cmd.record.status,
            });
        }

        self.transition(cmd, CommandStatus::Executing).await?;
        cmd.record.executed_at = Some(Utc::now());

        let limit = Duration::from_millis(self.config.gateway_timeout_ms);
        let result = match tokio::time::timeout(limit, cmd.command.perform_execution()).await {
            Ok(result) => result,
            Err(_) => Err(CommandFailure::timeout(format!(
                "execution exceeded {}ms",
                self.config.gateway_timeout_ms
            ))),
        };

        match result {
            Ok(output) => {
                cmd.record.error = None;
                cmd.set_output(Some(output.clone()));
                self.transition(cmd, CommandStatus::Completed).await?;
                info!(
                    command_id = %cmd.record.id,
                    kind = cmd.command.name(),
                    retry_count = cmd.record.retry_count,
                    "Command completed"
                );
                self.publish_outcome(cmd);
                Ok(output)
            }
            Err(failure) => {
                cmd.record.error = Some(failure.to_string());
                self.transition(cmd, CommandStatus::Failed).await?;
                warn!(
                    command_id = %cmd.record.id,
                    kind = cmd.command.name(),
                    retry_count = cmd.record.retry_count,
                    error = %failure,
                    "Command failed"
                );
                self.publish_outcome(cmd);
                Err(CommandError::Failed(failure))
            }
        }
    }

    /// Re-run a failed command after exponential backoff
    pub async fn retry<C: Command>(
        &self,
        cmd: &mut TrackedCommand<C>,
    ) -> Result<C::Output, CommandError> {
        if cmd.record.status != CommandStatus::Failed {
            return Err(CommandError::InvalidState {
                status: cmd.record.status,
                operation: "retry",
            });
        }
        if cmd.record.retry_count >= self.config.max_retries {
            return Err(CommandError::MaxRetriesExceeded {
                max: self.config.max_retries,
            });
        }

        let attempt = cmd.record.retry_count + 1;
        let delay = self.backoff(attempt);
        info!(
            command_id = %cmd.record.id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying command"
        );
        tokio::time::sleep(delay).await;

        cmd.record.retry_count = attempt;
        self.transition(cmd, CommandStatus::Pending).await?;
        self.execute(cmd).await
    }

    /// Reverse a completed, undoable command
    pub async fn undo<C: Command>(&self, cmd: &mut TrackedCommand<C>) -> Result<(), CommandError> {
        if !cmd.command.undoable() {
            return Err(CommandError::NotUndoable(cmd.record.kind.clone()));
        }
        if cmd.record.status != CommandStatus::Completed {
            return Err(CommandError::InvalidState {
                status: cmd.record.status,
                operation: "undo",
            });
        }
        let Some(output) = cmd.output().cloned() else {
            return Err(CommandError::InvalidState {
                status: cmd.record.status,
                operation: "undo",
            });
        };

        self.transition(cmd, CommandStatus::Undoing).await?;

        let limit = Duration::from_millis(self.config.gateway_timeout_ms);
        let result = match tokio::time::timeout(limit, cmd.command.perform_undo(&output)).await {
            Ok(result) => result,
            Err(_) => Err(CommandFailure::timeout(format!(
                "undo exceeded {}ms",
                self.config.gateway_timeout_ms
            ))),
        };

        match result {
            Ok(()) => {
                cmd.record.error = None;
                self.transition(cmd, CommandStatus::Undone).await?;
                info!(command_id = %cmd.record.id, kind = cmd.command.name(), "Command undone");
                Ok(())
            }
            Err(failure) => {
                cmd.record.error = Some(failure.to_string());
                self.transition(cmd, CommandStatus::Completed).await?;
                warn!(
                    command_id = %cmd.record.id,
                    error = %failure,
                    "Undo failed, command stays completed"
                );
                Err(CommandError::Failed(failure))
            }
        }
    }

    /// Execute, retrying retryable failures up to the configured cap
    ///
    /// A final failure raises a critical `risk_alert`.
    pub async fn execute_with_retry<C: Command>(
        &self,
        cmd: &mut TrackedCommand<C>,
    ) -> Result<C::Output, CommandError> {
        let mut result = self.execute(cmd).await;
        while let Err(CommandError::Failed(failure)) = &result {
            if !failure.is_retryable() || cmd.record.retry_count >= self.config.max_retries {
                break;
            }
            result = self.retry(cmd).await;
        }

        if let Err(e) = &result {
            error!(
                command_id = %cmd.record.id,
                kind = cmd.command.name(),
                retry_count = cmd.record.retry_count,
                error = %e,
                "Command failed permanently"
            );
            self.events.publish(DomainEvent::RiskAlert {
                severity: Severity::Critical,
                message: format!("{} failed: {}", cmd.command.name(), e),
                tracker_id: cmd
                    .record
                    .metadata
                    .get("tracker_id")
                    .and_then(|id| id.parse().ok()),
                command_id: Some(cmd.record.id),
                timestamp: Utc::now(),
            });
        }
        result
    }

    /// Delay before retry `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(factor))
    }

    async fn transition<C: Command>(
        &self,
        cmd: &mut TrackedCommand<C>,
        to: CommandStatus,
    ) -> Result<(), CommandError> {
        let from = cmd.record.status;
        if !from.can_transition_to(to) {
            return Err(CommandError::InvalidState {
                status: from,
                operation: "transition",
            });
        }
        cmd.record.status = to;

        let entry = AuditEntry {
            command_id: cmd.record.id,
            kind: cmd.record.kind.clone(),
            from,
            to,
            retry_count: cmd.record.retry_count,
            error: cmd.record.error.clone(),
            metadata: cmd.record.metadata.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.audit.append(entry).await {
            error!(command_id = %cmd.record.id, %from, %to, error = %e, "Audit append failed");
        }
        Ok(())
    }

    fn publish_outcome<C: Command>(&self, cmd: &TrackedCommand<C>) {
        telemetry::record_command(cmd.command.name(), cmd.record.status);
        self.events.publish(DomainEvent::CommandExecuted {
            command_id: cmd.record.id,
            kind: cmd.record.kind.clone(),
            status: cmd.record.status,
            error: cmd.record.error.clone(),
            timestamp: Utc::now(),
        });
    }
}
