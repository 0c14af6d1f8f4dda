//! Risk management module
//!
//! Risk curves, exit evaluation, and the entry-side circuit breaker and halt gate

mod breaker;
mod curves;
mod evaluator;
mod halt;
mod types;

pub use breaker::CircuitBreaker;
pub use curves::{sl_price_from_offset, RiskCurves};
pub use evaluator::ExitEvaluator;
pub use halt::TradingHaltGate;
pub use types::{BreakerStatus, ExitDecision, ExitSignals, GateReason, TradeGate};
