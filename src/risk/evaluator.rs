//! Exit evaluation
//!
//! Combines the session window, hard limits, risk curves and qualitative
//! signals into one exit decision. Pure: the caller persists the returned
//! marks and dispatches the exit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::curves::RiskCurves;
use super::types::{ExitDecision, ExitSignals};
use crate::config::{CapitalConfig, Config, HardLimitsConfig, SignalExitConfig};
use crate::position::{ExitReason, PositionMarks, PositionTracker};
use crate::session::SessionClock;

/// Decides whether an active position should be exited
#[derive(Debug, Clone)]
pub struct ExitEvaluator {
    curves: RiskCurves,
    limits: HardLimitsConfig,
    signals: SignalExitConfig,
    capital: CapitalConfig,
    session: SessionClock,
}

impl ExitEvaluator {
    pub fn new(
        curves: RiskCurves,
        limits: HardLimitsConfig,
        signals: SignalExitConfig,
        capital: CapitalConfig,
        session: SessionClock,
    ) -> Self {
        Self {
            curves,
            limits,
            signals,
            capital,
            session,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RiskCurves::from_config(config),
            config.limits.clone(),
            config.signals.clone(),
            config.capital.clone(),
            SessionClock::from_config(&config.session),
        )
    }

    pub fn curves(&self) -> &RiskCurves {
        &self.curves
    }

    pub fn session(&self) -> &SessionClock {
        &self.session
    }

    /// Evaluate a tracker against the current price
    ///
    /// Without a price only the session-end rule applies and the marks are
    /// left unchanged. Checks run in priority order and the first hit wins:
    /// session end, hard limits, trailing stop, peak drawdown, reverse
    /// stop-loss, then signal exits.
    pub fn evaluate(
        &self,
        tracker: &PositionTracker,
        ltp: Option<Decimal>,
        now: DateTime<Utc>,
        signals: &ExitSignals,
    ) -> ExitDecision {
        let session_end = self.session.in_exit_window(now);

        let Some(ltp) = ltp else {
            let decision = ExitDecision::hold(tracker.marks());
            return if session_end {
                decision.with_exit(ExitReason::SessionEnd)
            } else {
                decision
            };
        };

        let profit = tracker.profit_pct(ltp).round_dp(4);
        let hwm = tracker.high_water_mark_pct.max(profit);
        let underwater_since = if profit < Decimal::ZERO {
            tracker.underwater_since.or(Some(now))
        } else {
            None
        };
        let trailing_stop_price = self.ratchet_trailing_stop(tracker, hwm);

        let floor = tracker
            .index_key()
            .map(|key| self.capital.policy_for(key).drawdown_floor_pct)
            .unwrap_or(self.capital.fallback.drawdown_floor_pct);
        let allowed_drawdown = self.curves.allowed_drawdown(hwm, floor);
        let seconds_below = underwater_since
            .map(|since| (now - since).num_seconds())
            .unwrap_or(0);
        let reverse_stop = self
            .curves
            .reverse_stop_loss(profit, seconds_below, signals.atr_ratio);

        let decision = ExitDecision {
            should_exit: false,
            reason: None,
            reference_price: Some(ltp),
            profit_pct: Some(profit),
            marks: PositionMarks {
                high_water_mark_pct: hwm,
                trailing_stop_price,
                underwater_since,
            },
            allowed_drawdown,
            reverse_stop,
        };

        match self.first_breach(tracker, ltp, profit, hwm, &decision, signals, session_end) {
            Some(reason) => decision.with_exit(reason),
            None => decision,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn first_breach(
        &self,
        tracker: &PositionTracker,
        ltp: Decimal,
        profit: Decimal,
        hwm: Decimal,
        decision: &ExitDecision,
        signals: &ExitSignals,
        session_end: bool,
    ) -> Option<ExitReason> {
        if session_end {
            return Some(ExitReason::SessionEnd);
        }

        if self.limits.enabled {
            if profit <= -self.limits.stop_loss_pct {
                return Some(ExitReason::HardStopLoss);
            }
            if profit >= self.limits.take_profit_pct {
                return Some(ExitReason::TakeProfit);
            }
        }

        if let Some(stop) = decision.marks.trailing_stop_price {
            let crossed = if tracker.side.is_long() {
                ltp <= stop
            } else {
                ltp >= stop
            };
            if crossed {
                return Some(ExitReason::TrailingStop);
            }
        }

        if let Some(allowed) = decision.allowed_drawdown {
            let offset = self.curves.trailing_offset(hwm);
            if self.curves.peak_drawdown_active(hwm, offset) && hwm - profit > allowed {
                return Some(ExitReason::PeakDrawdown);
            }
        }

        if let Some(reverse) = decision.reverse_stop {
            if -profit >= reverse {
                return Some(ExitReason::ReverseStopLoss);
            }
        }

        if self.signals.early_trend_failure && signals.early_trend_failure {
            return Some(ExitReason::EarlyTrendFailure);
        }
        if self.signals.structure_break && signals.structure_break {
            return Some(ExitReason::StructureBreak);
        }

        None
    }

    /// Trailing stop price for the peak, ratcheted in the favourable direction only
    fn ratchet_trailing_stop(&self, tracker: &PositionTracker, hwm: Decimal) -> Option<Decimal> {
        let existing = tracker.trailing_stop_price;
        let activation = self.curves.trailing_activation_pct()?;
        if !self.curves.trailing_enabled() || hwm < activation {
            return existing;
        }

        let offset = self.curves.trailing_offset(hwm);
        let base = tracker.average_price;
        let candidate = if tracker.side.is_long() {
            base * (Decimal::ONE + offset / dec!(100))
        } else {
            base * (Decimal::ONE - offset / dec!(100))
        };

        Some(match existing {
            Some(current) if tracker.side.is_long() => current.max(candidate),
            Some(current) => current.min(candidate),
            None => candidate,
        })
    }
}
