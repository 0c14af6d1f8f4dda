//! exit-guard: Adaptive position risk and exit management for intraday index options
//!
//! This library provides the core components for:
//! - Position lifecycle tracking with check-and-set status transitions
//! - Profit-aware drawdown, reverse stop-loss and trailing stop curves
//! - Exit evaluation over live prices and signal-layer inputs
//! - Band-based capital allocation and a per-day balance ledger
//! - Circuit breaker and profit-protection halt gate
//! - Audited, retryable command execution against an order gateway
//! - Supervised background workers for monitoring and reconciliation
//! - Full observability stack

pub mod capital;
pub mod cli;
pub mod command;
pub mod config;
pub mod events;
pub mod execution;
pub mod feed;
pub mod monitor;
pub mod position;
pub mod risk;
pub mod session;
pub mod supervisor;
pub mod telemetry;
