//! Paper trading gateway

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{GatewayError, OrderAck, OrderGateway, OrderId, PlaceRequest};
use crate::capital::{BalanceLedger, LedgerError};
use crate::position::PositionTracker;
use crate::session::SessionClock;

/// Paper gateway with simulated fills at the reference price
///
/// Entries debit `price * quantity` from the day's ledger; exits credit the
/// entry cost back plus the realized P&L.
pub struct PaperGateway {
    ledger: Arc<BalanceLedger>,
    session: SessionClock,
    fills: Arc<RwLock<Vec<OrderAck>>>,
}

impl PaperGateway {
    /// Create a new paper gateway
    pub fn new(ledger: Arc<BalanceLedger>, session: SessionClock) -> Self {
        Self {
            ledger,
            session,
            fills: Arc::new(RwLock::new(vec![])),
        }
    }

    /// All simulated fills, oldest first
    pub async fn fills(&self) -> Vec<OrderAck> {
        self.fills.read().await.clone()
    }

    async fn record(&self, ack: OrderAck) -> OrderAck {
        self.fills.write().await.push(ack.clone());
        ack
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn exit_market(
        &self,
        tracker: &PositionTracker,
        reference_price: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        if reference_price <= Decimal::ZERO {
            return Err(GatewayError::Rejected(format!(
                "invalid exit price {reference_price}"
            )));
        }

        let now = Utc::now();
        let proceeds = (tracker.entry_cost() + tracker.pnl_at(reference_price)).max(Decimal::ZERO);
        let balance = self
            .ledger
            .credit(self.session.trading_day(now), proceeds)?;

        let ack = OrderAck {
            order_id: OrderId::new_v4(),
            instrument: tracker.instrument.clone(),
            fill_price: reference_price,
            quantity: tracker.quantity,
            timestamp: now,
        };
        tracing::info!(
            order_id = %ack.order_id,
            tracker_id = %tracker.id,
            price = %reference_price,
            %proceeds,
            %balance,
            "Paper exit filled"
        );
        Ok(self.record(ack).await)
    }

    async fn place_market(&self, request: &PlaceRequest) -> Result<OrderAck, GatewayError> {
        if request.quantity == 0 || request.price <= Decimal::ZERO {
            return Err(GatewayError::Rejected(
                "quantity and price must be positive".into(),
            ));
        }

        let now = Utc::now();
        let day = self.session.trading_day(now);
        let cost = request.price * Decimal::from(request.quantity);
        let balance = self.ledger.try_debit(day, cost).map_err(|e| match e {
            LedgerError::InsufficientBalance {
                required,
                available,
            } => GatewayError::InsufficientFunds {
                required,
                available,
            },
            other => GatewayError::Ledger(other),
        })?;

        let ack = OrderAck {
            order_id: OrderId::new_v4(),
            instrument: request.instrument.clone(),
            fill_price: request.price,
            quantity: request.quantity,
            timestamp: now,
        };
        tracing::info!(
            order_id = %ack.order_id,
            symbol = %request.instrument.symbol,
            quantity = request.quantity,
            price = %request.price,
            %balance,
            "Paper order filled"
        );
        Ok(self.record(ack).await)
    }

    fn mode_name(&self) -> &'static str {
        "paper"
    }
}
