//! Parametric risk curves
//!
//! Side-effect-free functions mapping profit, loss, time under water and
//! volatility to allowed give-back and stop distances. All percentages are
//! expressed in percentage points (10 = 10%).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{Config, DrawdownCurveConfig, ReverseStopConfig, TrailingConfig};

/// Decimal places kept on curve outputs
const CURVE_DP: u32 = 4;

/// Drawdown, reverse stop-loss and trailing tier curves
#[derive(Debug, Clone)]
pub struct RiskCurves {
    drawdown: DrawdownCurveConfig,
    reverse: ReverseStopConfig,
    trailing: TrailingConfig,
}

impl RiskCurves {
    /// Create curves from explicit policies; trailing tiers are sorted by threshold
    pub fn new(
        drawdown: DrawdownCurveConfig,
        reverse: ReverseStopConfig,
        mut trailing: TrailingConfig,
    ) -> Self {
        trailing
            .tiers
            .sort_by(|a, b| a.threshold_pct.cmp(&b.threshold_pct));
        for penalty in reverse.atr_penalties.iter().filter(|p| p.ratio >= Decimal::ONE) {
            tracing::warn!(
                ratio = %penalty.ratio,
                "Ignoring ATR penalty threshold at or above 1.0"
            );
        }
        Self {
            drawdown,
            reverse,
            trailing,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.drawdown.clone(),
            config.reverse_sl.clone(),
            config.trailing.clone(),
        )
    }

    pub fn trailing_enabled(&self) -> bool {
        self.trailing.enabled && !self.trailing.tiers.is_empty()
    }

    /// Profit at which the first trailing tier engages
    pub fn trailing_activation_pct(&self) -> Option<Decimal> {
        self.trailing.tiers.first().map(|t| t.threshold_pct)
    }

    /// Allowed drop of profit from its peak, in percentage points
    ///
    /// `None` below the activation profit or when disabled. Between
    /// `profit_min` and `profit_max` the allowance decays exponentially from
    /// `dd_start` to `dd_end`; above `profit_max` it stays at `dd_end`. The
    /// result never goes below `index_floor`.
    pub fn allowed_drawdown(&self, profit_pct: Decimal, index_floor: Decimal) -> Option<Decimal> {
        let cfg = &self.drawdown;
        if !cfg.enabled || profit_pct < cfg.profit_min_pct {
            return None;
        }

        let span = cfg.profit_max_pct - cfg.profit_min_pct;
        let dd = if span <= Decimal::ZERO || profit_pct >= cfg.profit_max_pct {
            cfg.dd_end_pct
        } else {
            let x: f64 = ((profit_pct - cfg.profit_min_pct) / span)
                .try_into()
                .unwrap_or(1.0);
            let weight = decay_weight(x, cfg.k);
            let weight = Decimal::try_from(weight).unwrap_or(Decimal::ZERO);
            cfg.dd_end_pct + (cfg.dd_start_pct - cfg.dd_end_pct) * weight
        };

        Some(dd.round_dp(CURVE_DP).max(index_floor))
    }

    /// Allowed loss (positive percentage) before a losing position is cut
    ///
    /// `None` when disabled or when the position is not under water. The
    /// allowance narrows linearly with the size of the loss, then tightens
    /// with time spent below entry and with every ATR threshold crossed,
    /// and is finally clamped to `[min_loss_pct, max_loss_pct]`.
    pub fn reverse_stop_loss(
        &self,
        pnl_pct: Decimal,
        seconds_below_entry: i64,
        atr_ratio: Option<Decimal>,
    ) -> Option<Decimal> {
        let cfg = &self.reverse;
        if !cfg.enabled || pnl_pct >= Decimal::ZERO {
            return None;
        }

        let loss = -pnl_pct;
        let progress = if cfg.loss_span_pct <= Decimal::ZERO {
            Decimal::ONE
        } else {
            (loss / cfg.loss_span_pct).min(Decimal::ONE)
        };
        let base = cfg.max_loss_pct - (cfg.max_loss_pct - cfg.min_loss_pct) * progress;

        let minutes = Decimal::from(seconds_below_entry.max(0)) / dec!(60);
        let time_tightening = minutes * cfg.tighten_per_minute;

        let atr_penalty: Decimal = match atr_ratio {
            Some(ratio) => cfg
                .atr_penalties
                .iter()
                .filter(|p| p.ratio < Decimal::ONE && ratio <= p.ratio)
                .map(|p| p.penalty_pct)
                .sum(),
            None => Decimal::ZERO,
        };

        let allowed = base - time_tightening - atr_penalty;
        Some(
            allowed
                .max(cfg.min_loss_pct)
                .min(cfg.max_loss_pct)
                .round_dp(CURVE_DP),
        )
    }

    /// Trailing stop offset for a profit level
    ///
    /// Offset of the highest tier whose threshold is at or below
    /// `profit_pct`, or of the lowest tier below the first threshold.
    pub fn trailing_offset(&self, profit_pct: Decimal) -> Decimal {
        let tiers = &self.trailing.tiers;
        let mut offset = tiers.first().map(|t| t.offset_pct).unwrap_or(Decimal::ZERO);
        for tier in tiers {
            if profit_pct >= tier.threshold_pct {
                offset = tier.offset_pct;
            } else {
                break;
            }
        }
        offset
    }

    /// Peak-drawdown exits only engage once profit has crossed the activation
    /// level and the trailing offset itself has risen far enough
    pub fn peak_drawdown_active(&self, profit_pct: Decimal, current_offset_pct: Decimal) -> bool {
        let gate = &self.trailing.peak_drawdown;
        profit_pct >= gate.activation_profit_pct && current_offset_pct >= gate.min_offset_pct
    }
}

/// Normalized exponential weight: 1 at x = 0, 0 at x = 1
fn decay_weight(x: f64, k: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    if k <= 0.0 {
        return 1.0 - x;
    }
    let floor = (-k).exp();
    ((-k * x).exp() - floor) / (1.0 - floor)
}

/// Stop price `offset_pct` away from entry
///
/// Positive offsets lock in profit, negative offsets allow a loss.
pub fn sl_price_from_offset(entry_price: Decimal, offset_pct: Decimal) -> Decimal {
    entry_price * (Decimal::ONE + offset_pct / dec!(100))
}
