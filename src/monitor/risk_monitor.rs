//! Risk monitor worker
//!
//! Each pass evaluates every active tracker independently, persists the
//! updated marks, and hands exits to spawned tasks so the pass never waits
//! on the gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::types::TickReport;
use super::SignalSource;
use crate::command::{CommandContext, CommandExecutor, ExitPositionCommand, TrackedCommand};
use crate::config::BreakerConfig;
use crate::position::{PositionStatus, PositionTracker, RepositoryError};
use crate::risk::{CircuitBreaker, ExitDecision, ExitEvaluator};
use crate::supervisor::Worker;
use crate::telemetry::{self, GaugeMetric, LatencyMetric};

/// Periodic exit evaluation over all active trackers
pub struct RiskMonitor {
    evaluator: Arc<ExitEvaluator>,
    ctx: CommandContext,
    executor: Arc<CommandExecutor>,
    signals: Arc<dyn SignalSource>,
    breaker: Arc<CircuitBreaker>,
    breaker_config: BreakerConfig,
    interval: Duration,
    exits: Mutex<JoinSet<()>>,
    consecutive_failures: Arc<AtomicU32>,
}

impl RiskMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        evaluator: Arc<ExitEvaluator>,
        ctx: CommandContext,
        executor: Arc<CommandExecutor>,
        signals: Arc<dyn SignalSource>,
        breaker: Arc<CircuitBreaker>,
        breaker_config: BreakerConfig,
        interval: Duration,
    ) -> Self {
        Self {
            evaluator,
            ctx,
            executor,
            signals,
            breaker,
            breaker_config,
            interval,
            exits: Mutex::new(JoinSet::new()),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Failed exits since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// One pass over the active trackers
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, RepositoryError> {
        let started = Instant::now();
        self.reap_finished_exits().await;
        let active = self
            .ctx
            .repository
            .list_by_status(PositionStatus::Active)
            .await?;
        telemetry::set_gauge(GaugeMetric::OpenPositions, active.len() as f64);

        let mut report = TickReport::default();
        let (candidates, claimed): (Vec<_>, Vec<_>) = active
            .into_iter()
            .partition(|t| !self.ctx.claims.is_claimed(t.id));
        report.skipped = claimed.len();

        let results = join_all(candidates.iter().map(|t| self.check(t, now))).await;

        for (tracker, result) in candidates.iter().zip(results) {
            match result {
                Ok(decision) => {
                    report.evaluated += 1;
                    if decision.should_exit && self.dispatch(tracker, &decision).await {
                        report.exits_dispatched += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(tracker_id = %tracker.id, error = %e, "Tracker evaluation failed");
                }
            }
        }

        telemetry::record_tick_errors(report.errors as u64);
        telemetry::set_gauge(
            GaugeMetric::ExitsInFlight,
            self.ctx.claims.in_flight() as f64,
        );
        telemetry::record_latency(LatencyMetric::MonitorTick, started.elapsed());
        debug!(
            evaluated = report.evaluated,
            skipped = report.skipped,
            exits = report.exits_dispatched,
            errors = report.errors,
            "Risk monitor tick"
        );
        Ok(report)
    }

    /// Exit tasks spawned and not yet reaped
    pub async fn pending_exits(&self) -> usize {
        self.exits.lock().await.len()
    }

    async fn reap_finished_exits(&self) {
        let mut exits = self.exits.lock().await;
        while let Some(joined) = exits.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Exit task panicked");
            }
        }
    }

    /// Wait for every dispatched exit to finish
    pub async fn wait_for_exits(&self) {
        let mut pending = std::mem::take(&mut *self.exits.lock().await);
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Exit task panicked");
            }
        }
    }

    async fn check(
        &self,
        tracker: &PositionTracker,
        now: DateTime<Utc>,
    ) -> Result<ExitDecision, RepositoryError> {
        let instrument = &tracker.instrument;
        let ltp = self
            .ctx
            .prices
            .last_traded_price(&instrument.exchange_segment, &instrument.security_id)
            .await;
        if ltp.is_none() {
            debug!(tracker_id = %tracker.id, symbol = %instrument.symbol, "No price, session-end check only");
        }

        let signals = self.signals.signals_for(tracker).await;
        let decision = self.evaluator.evaluate(tracker, ltp, now, &signals);

        if decision.marks != tracker.marks() {
            self.ctx
                .repository
                .update_marks(tracker.id, &decision.marks, now)
                .await?;
        }
        Ok(decision)
    }

    /// Spawn the exit; false if another exit got the claim first
    async fn dispatch(&self, tracker: &PositionTracker, decision: &ExitDecision) -> bool {
        let Some(reason) = decision.reason else {
            return false;
        };
        let Some(claim) = self.ctx.claims.try_claim(tracker.id) else {
            debug!(tracker_id = %tracker.id, "Exit already in flight");
            return false;
        };

        info!(
            tracker_id = %tracker.id,
            symbol = %tracker.instrument.symbol,
            %reason,
            price = ?decision.reference_price,
            profit_pct = ?decision.profit_pct,
            "Exit triggered"
        );

        let command = ExitPositionCommand::new(
            self.ctx.clone(),
            tracker.id,
            reason,
            decision.reference_price,
        )
        .with_claim(claim);
        let executor = self.executor.clone();
        let breaker = self.breaker.clone();
        let failures = self.consecutive_failures.clone();
        let config = self.breaker_config.clone();

        self.exits.lock().await.spawn(async move {
            let mut tracked = TrackedCommand::new(command);
            match executor.execute_with_retry(&mut tracked).await {
                Ok(_) => failures.store(0, Ordering::SeqCst),
                Err(e) => {
                    let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                    error!(
                        command_id = %tracked.id(),
                        tracker_id = %tracked.command.tracker_id(),
                        consecutive_failures = count,
                        error = %e,
                        "Exit failed"
                    );
                    trip_on_failures(&breaker, &config, count);
                }
            }
        });
        true
    }
}

fn trip_on_failures(breaker: &CircuitBreaker, config: &BreakerConfig, count: u32) {
    if config.exit_failure_threshold == 0 || count < config.exit_failure_threshold {
        return;
    }
    if breaker.is_tripped(Utc::now()) {
        return;
    }
    let ttl = i64::try_from(config.trip_ttl_secs)
        .ok()
        .map(chrono::Duration::seconds);
    breaker.trip(format!("{count} consecutive exit failures"), ttl);
    telemetry::record_breaker_trip();
}

#[async_trait]
impl Worker for RiskMonitor {
    fn name(&self) -> &str {
        "risk_monitor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.tick(Utc::now()).await?;
        Ok(())
    }

    async fn on_stop(&self) {
        self.wait_for_exits().await;
    }
}
