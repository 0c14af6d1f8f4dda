//! Execution module
//!
//! Order gateway boundary (paper and live modes)

mod paper;
mod types;

pub use paper::PaperGateway;
pub use types::{GatewayError, OrderAck, OrderId, PlaceRequest};

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::capital::BalanceLedger;
use crate::config::{ExecutionConfig, ExecutionMode};
use crate::position::PositionTracker;
use crate::session::SessionClock;

/// Trait for broker order gateways
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Close the whole tracker at market
    async fn exit_market(
        &self,
        tracker: &PositionTracker,
        reference_price: Decimal,
    ) -> Result<OrderAck, GatewayError>;

    /// Open or add to a position at market
    async fn place_market(&self, request: &PlaceRequest) -> Result<OrderAck, GatewayError>;

    /// "paper" or "live"
    fn mode_name(&self) -> &'static str;
}

/// Build the gateway for the configured execution mode
pub fn create_gateway(
    config: &ExecutionConfig,
    ledger: Arc<BalanceLedger>,
    session: SessionClock,
) -> anyhow::Result<Arc<dyn OrderGateway>> {
    match config.mode {
        ExecutionMode::Paper => Ok(Arc::new(PaperGateway::new(ledger, session))),
        ExecutionMode::Live => {
            anyhow::bail!("live execution requires a broker gateway; none is bundled")
        }
    }
}
