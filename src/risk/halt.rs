//! Profit-protection halt gate
//!
//! Once the day's realized profit reaches the threshold, new entries need a
//! confident signal. Anything that prevents the check from running lets
//! trading continue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{GateReason, TradeGate};
use crate::capital::BalanceLedger;
use crate::config::HaltGateConfig;
use crate::position::PositionRepository;
use crate::session::SessionClock;

/// Gate on new entries after a strong day
pub struct TradingHaltGate {
    repository: Arc<dyn PositionRepository>,
    ledger: Arc<BalanceLedger>,
    config: HaltGateConfig,
    session: SessionClock,
}

impl TradingHaltGate {
    pub fn new(
        repository: Arc<dyn PositionRepository>,
        ledger: Arc<BalanceLedger>,
        config: HaltGateConfig,
        session: SessionClock,
    ) -> Self {
        Self {
            repository,
            ledger,
            config,
            session,
        }
    }

    pub async fn can_trade(&self, confidence: Option<Decimal>) -> TradeGate {
        self.can_trade_at(confidence, Utc::now()).await
    }

    /// Check the gate for the trading day containing `now`
    pub async fn can_trade_at(&self, confidence: Option<Decimal>, now: DateTime<Utc>) -> TradeGate {
        if !self.config.enabled {
            return TradeGate::allow(GateReason::Disabled);
        }

        let Some(realized_pct) = self.realized_pct(now).await else {
            return TradeGate::allow(GateReason::FailOpen);
        };

        if realized_pct < self.config.profit_threshold_pct {
            debug!(%realized_pct, "Below profit protection threshold");
            return TradeGate::allow(GateReason::BelowThreshold);
        }

        match confidence {
            Some(c) if c >= self.config.min_confidence => {
                info!(%realized_pct, confidence = %c, "Profit protection passed on confidence");
                TradeGate::allow(GateReason::HighConfidence)
            }
            _ => {
                info!(
                    %realized_pct,
                    confidence = ?confidence,
                    min_confidence = %self.config.min_confidence,
                    "Profit protection engaged, entry refused"
                );
                TradeGate::deny(GateReason::ProfitProtection)
            }
        }
    }

    /// Realized P&L of the day as a percentage of its initial balance
    async fn realized_pct(&self, now: DateTime<Utc>) -> Option<Decimal> {
        let day = self.session.trading_day(now);
        let initial = match self.ledger.initial_balance(day) {
            Ok(initial) if initial > Decimal::ZERO => initial,
            Ok(initial) => {
                warn!(%initial, "Non-positive initial capital, halt gate open");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Ledger unavailable, halt gate open");
                return None;
            }
        };

        match self
            .repository
            .realized_pnl_since(self.session.day_start(now))
            .await
        {
            Ok(pnl) => Some(pnl / initial * dec!(100)),
            Err(e) => {
                warn!(error = %e, "Realized P&L unavailable, halt gate open");
                None
            }
        }
    }
}
