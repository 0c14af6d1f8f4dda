//! Prometheus metrics

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::command::CommandStatus;
use crate::position::ExitReason;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One risk monitor pass over all active trackers
    MonitorTick,
    /// One gateway round trip
    GatewayCall,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Active tracker count
    OpenPositions,
    /// Paper ledger balance for the current day
    LedgerBalance,
    /// Exits currently holding a claim
    ExitsInFlight,
    /// Unrealized P&L across active trackers
    UnrealizedPnl,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::MonitorTick => "exitguard_monitor_tick_ms",
        LatencyMetric::GatewayCall => "exitguard_gateway_call_ms",
    };
    histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::OpenPositions => "exitguard_open_positions",
        GaugeMetric::LedgerBalance => "exitguard_ledger_balance",
        GaugeMetric::ExitsInFlight => "exitguard_exits_in_flight",
        GaugeMetric::UnrealizedPnl => "exitguard_unrealized_pnl",
    };
    gauge!(metric_name).set(value);
}

/// Count a completed exit by reason
pub fn record_exit(reason: ExitReason) {
    counter!("exitguard_exits_total", "reason" => reason.as_str()).increment(1);
}

/// Count a command outcome
pub fn record_command(kind: &'static str, status: CommandStatus) {
    counter!("exitguard_commands_total", "kind" => kind, "status" => status.as_str()).increment(1);
}

/// Count per-tracker evaluation errors in a monitor tick
pub fn record_tick_errors(count: u64) {
    if count > 0 {
        counter!("exitguard_tick_errors_total").increment(count);
    }
}

/// Count automatic circuit breaker trips
pub fn record_breaker_trip() {
    counter!("exitguard_breaker_trips_total").increment(1);
}
