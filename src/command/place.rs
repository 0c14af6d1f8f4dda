//! Place order command

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::types::CommandFailure;
use super::{gateway_failure, Command, CommandContext};
use crate::execution::{OrderAck, PlaceRequest};
use crate::position::{EntryFill, ExitReason, PositionStatus, PositionTracker};
use crate::risk::{CircuitBreaker, TradingHaltGate};
use crate::telemetry::{self, LatencyMetric};

/// Checks an entry must pass before reaching the gateway
#[derive(Clone)]
pub struct EntryGuards {
    pub breaker: Arc<CircuitBreaker>,
    pub halt: Option<Arc<TradingHaltGate>>,
}

/// Result of a completed entry
#[derive(Debug, Clone)]
pub struct PlaceOutcome {
    pub tracker: PositionTracker,
    pub ack: OrderAck,
    /// The fill was averaged into an existing position
    pub averaged: bool,
}

/// Open a position (or add to the active one) at market
pub struct PlaceOrderCommand {
    ctx: CommandContext,
    request: PlaceRequest,
    guards: EntryGuards,
    confidence: Option<Decimal>,
    lot_size: u32,
}

impl PlaceOrderCommand {
    pub fn new(
        ctx: CommandContext,
        request: PlaceRequest,
        guards: EntryGuards,
        lot_size: u32,
    ) -> Self {
        Self {
            ctx,
            request,
            guards,
            confidence: None,
            lot_size,
        }
    }

    /// Signal confidence, consulted by the profit-protection gate
    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn request(&self) -> &PlaceRequest {
        &self.request
    }

    fn validate(&self) -> Result<(), CommandFailure> {
        let request = &self.request;
        if request.quantity == 0 {
            return Err(CommandFailure::validation("quantity must be positive"));
        }
        if self.lot_size == 0 || request.quantity % self.lot_size != 0 {
            return Err(CommandFailure::validation(format!(
                "quantity {} is not a multiple of lot size {}",
                request.quantity, self.lot_size
            )));
        }
        if request.price <= Decimal::ZERO {
            return Err(CommandFailure::validation(format!(
                "invalid entry price {}",
                request.price
            )));
        }
        Ok(())
    }

    async fn check_guards(&self) -> Result<(), CommandFailure> {
        if self.guards.breaker.is_tripped(Utc::now()) {
            warn!(symbol = %self.request.instrument.symbol, "Entry refused, circuit breaker tripped");
            return Err(CommandFailure::validation("circuit breaker tripped"));
        }
        if let Some(halt) = &self.guards.halt {
            let gate = halt.can_trade(self.confidence).await;
            if !gate.allowed {
                return Err(CommandFailure::validation(format!(
                    "entry refused: {:?}",
                    gate.reason
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Command for PlaceOrderCommand {
    type Output = PlaceOutcome;

    fn name(&self) -> &'static str {
        "place_order"
    }

    fn undoable(&self) -> bool {
        true
    }

    fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("symbol".to_string(), self.request.instrument.symbol.clone());
        metadata.insert("side".to_string(), format!("{:?}", self.request.side));
        metadata.insert("quantity".to_string(), self.request.quantity.to_string());
        metadata.insert("price".to_string(), self.request.price.to_string());
        metadata
    }

    async fn perform_execution(&self) -> Result<PlaceOutcome, CommandFailure> {
        self.validate()?;
        self.check_guards().await?;

        let instrument = &self.request.instrument;
        let averaged = self
            .ctx
            .repository
            .find_active(&instrument.exchange_segment, &instrument.security_id)
            .await
            .map_err(|e| CommandFailure::execution(e.to_string()))?
            .is_some();

        let started = Instant::now();
        let result = self.ctx.gateway.place_market(&self.request).await;
        telemetry::record_latency(LatencyMetric::GatewayCall, started.elapsed());
        let ack = result.map_err(gateway_failure)?;

        let fill = EntryFill {
            instrument: ack.instrument.clone(),
            side: self.request.side,
            quantity: ack.quantity,
            price: ack.fill_price,
            metadata: self.request.metadata.clone(),
            filled_at: ack.timestamp,
        };
        let tracker = match self.ctx.repository.record_fill(fill).await {
            Ok(tracker) => tracker,
            Err(e) => {
                // Filled at the broker; retrying would buy twice
                error!(
                    order_id = %ack.order_id,
                    symbol = %instrument.symbol,
                    error = %e,
                    "Entry filled but position was not recorded"
                );
                return Err(CommandFailure::validation(e.to_string()));
            }
        };

        info!(
            tracker_id = %tracker.id,
            symbol = %instrument.symbol,
            quantity = tracker.quantity,
            average_price = %tracker.average_price,
            averaged,
            "Entry placed"
        );
        Ok(PlaceOutcome {
            tracker,
            ack,
            averaged,
        })
    }

    async fn perform_undo(&self, output: &PlaceOutcome) -> Result<(), CommandFailure> {
        if output.averaged {
            return Err(CommandFailure::validation(
                "cannot undo an entry averaged into an existing position",
            ));
        }

        let tracker = self
            .ctx
            .repository
            .get(output.tracker.id)
            .await
            .map_err(|e| CommandFailure::execution(e.to_string()))?
            .ok_or_else(|| {
                CommandFailure::validation(format!("position {} not found", output.tracker.id))
            })?;
        if tracker.status != PositionStatus::Active {
            return Err(CommandFailure::validation(format!(
                "position {} is {}, not active",
                tracker.id, tracker.status
            )));
        }

        let instrument = &tracker.instrument;
        let price = self
            .ctx
            .prices
            .last_traded_price(&instrument.exchange_segment, &instrument.security_id)
            .await
            .unwrap_or(output.ack.fill_price);

        let ack = self
            .ctx
            .gateway
            .exit_market(&tracker, price)
            .await
            .map_err(gateway_failure)?;

        let fill_price = ack.fill_price;
        let exited_at = ack.timestamp;
        self.ctx
            .repository
            .transition(
                tracker.id,
                PositionStatus::Active,
                PositionStatus::Cancelled,
                Some(Box::new(move |t: &mut PositionTracker| {
                    t.record_exit(fill_price, ExitReason::Manual, exited_at)
                })),
            )
            .await
            .map_err(|e| CommandFailure::validation(e.to_string()))?;

        info!(tracker_id = %tracker.id, price = %fill_price, "Entry reversed");
        Ok(())
    }
}
