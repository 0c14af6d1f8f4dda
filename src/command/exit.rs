//! Exit position command

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::CommandFailure;
use super::{gateway_failure, Command, CommandContext};
use crate::events::DomainEvent;
use crate::execution::OrderAck;
use crate::position::{ExitClaim, ExitReason, PositionStatus, PositionTracker};
use crate::telemetry::{self, LatencyMetric};

/// Result of a completed exit
#[derive(Debug, Clone)]
pub struct ExitOutcome {
    pub tracker: PositionTracker,
    pub ack: OrderAck,
}

/// Close an active position at market
///
/// Holds the tracker's exit claim for its whole lifetime, retries included,
/// so a second exit for the same tracker aborts before reaching the gateway.
pub struct ExitPositionCommand {
    ctx: CommandContext,
    tracker_id: Uuid,
    reason: ExitReason,
    price: Option<Decimal>,
    claim: Mutex<Option<ExitClaim>>,
}

impl ExitPositionCommand {
    pub fn new(
        ctx: CommandContext,
        tracker_id: Uuid,
        reason: ExitReason,
        price: Option<Decimal>,
    ) -> Self {
        Self {
            ctx,
            tracker_id,
            reason,
            price,
            claim: Mutex::new(None),
        }
    }

    /// Use a claim the caller already holds
    pub fn with_claim(mut self, claim: ExitClaim) -> Self {
        if claim.tracker_id() == self.tracker_id {
            *self.claim.get_mut() = Some(claim);
        }
        self
    }

    pub fn tracker_id(&self) -> Uuid {
        self.tracker_id
    }

    pub fn reason(&self) -> ExitReason {
        self.reason
    }

    fn ensure_claim(&self) -> Result<(), CommandFailure> {
        let mut slot = self.claim.lock();
        if slot.is_some() {
            return Ok(());
        }
        match self.ctx.claims.try_claim(self.tracker_id) {
            Some(claim) => {
                *slot = Some(claim);
                Ok(())
            }
            None => Err(CommandFailure::validation(format!(
                "exit already in flight for {}",
                self.tracker_id
            ))),
        }
    }

    async fn resolve_price(&self, tracker: &PositionTracker) -> Decimal {
        if let Some(price) = self.price.filter(|p| *p > Decimal::ZERO) {
            return price;
        }
        let instrument = &tracker.instrument;
        if let Some(ltp) = self
            .ctx
            .prices
            .last_traded_price(&instrument.exchange_segment, &instrument.security_id)
            .await
        {
            return ltp;
        }
        warn!(
            tracker_id = %tracker.id,
            symbol = %instrument.symbol,
            "No live price, exiting at average price"
        );
        tracker.average_price
    }
}

#[async_trait]
impl Command for ExitPositionCommand {
    type Output = ExitOutcome;

    fn name(&self) -> &'static str {
        "exit_position"
    }

    fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("tracker_id".to_string(), self.tracker_id.to_string());
        metadata.insert("reason".to_string(), self.reason.to_string());
        if let Some(price) = self.price {
            metadata.insert("price".to_string(), price.to_string());
        }
        metadata
    }

    async fn perform_execution(&self) -> Result<ExitOutcome, CommandFailure> {
        // Claim before reading: a snapshot read without the claim can go stale
        // while another exit finishes and releases it
        self.ensure_claim()?;

        let tracker = self
            .ctx
            .repository
            .get(self.tracker_id)
            .await
            .map_err(|e| CommandFailure::execution(e.to_string()))?
            .ok_or_else(|| {
                CommandFailure::validation(format!("position {} not found", self.tracker_id))
            })?;
        if tracker.status != PositionStatus::Active {
            return Err(CommandFailure::validation(format!(
                "position {} is {}, not active",
                tracker.id, tracker.status
            )));
        }

        let price = self.resolve_price(&tracker).await;
        let started = Instant::now();
        let result = self.ctx.gateway.exit_market(&tracker, price).await;
        telemetry::record_latency(LatencyMetric::GatewayCall, started.elapsed());
        let ack = result.map_err(gateway_failure)?;

        let fill_price = ack.fill_price;
        let reason = self.reason;
        let exited_at = ack.timestamp;
        let updated = match self
            .ctx
            .repository
            .transition(
                tracker.id,
                PositionStatus::Active,
                PositionStatus::Exited,
                Some(Box::new(move |t: &mut PositionTracker| {
                    t.record_exit(fill_price, reason, exited_at)
                })),
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                // The order already filled; a retry would exit twice
                error!(
                    tracker_id = %tracker.id,
                    order_id = %ack.order_id,
                    error = %e,
                    "Exit filled but position update failed"
                );
                return Err(CommandFailure::validation(e.to_string()));
            }
        };

        info!(
            tracker_id = %updated.id,
            symbol = %updated.instrument.symbol,
            %reason,
            price = %fill_price,
            realized_pnl = ?updated.realized_pnl,
            "Position exited"
        );
        telemetry::record_exit(reason);
        self.ctx.events.publish(DomainEvent::ExitTriggered {
            tracker_id: updated.id,
            symbol: updated.instrument.symbol.clone(),
            reason,
            exit_price: fill_price,
            realized_pnl: updated.realized_pnl,
            timestamp: Utc::now(),
        });

        Ok(ExitOutcome {
            tracker: updated,
            ack,
        })
    }
}
