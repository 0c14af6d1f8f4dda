//! Position heartbeat

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::types::HeartbeatReport;
use crate::capital::BalanceLedger;
use crate::feed::PriceSource;
use crate::position::{PositionRepository, PositionStatus, RepositoryError};
use crate::session::SessionClock;
use crate::supervisor::Worker;
use crate::telemetry::{self, GaugeMetric};

/// Periodic summary of open exposure and balance
pub struct PositionHeartbeat {
    repository: Arc<dyn PositionRepository>,
    prices: Arc<dyn PriceSource>,
    ledger: Arc<BalanceLedger>,
    session: SessionClock,
    interval: Duration,
}

impl PositionHeartbeat {
    pub fn new(
        repository: Arc<dyn PositionRepository>,
        prices: Arc<dyn PriceSource>,
        ledger: Arc<BalanceLedger>,
        session: SessionClock,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            prices,
            ledger,
            session,
            interval,
        }
    }

    pub async fn beat(&self, now: DateTime<Utc>) -> Result<HeartbeatReport, RepositoryError> {
        let active = self
            .repository
            .list_by_status(PositionStatus::Active)
            .await?;

        let mut unrealized_pnl = Decimal::ZERO;
        let mut unpriced = 0;
        for tracker in &active {
            let instrument = &tracker.instrument;
            match self
                .prices
                .last_traded_price(&instrument.exchange_segment, &instrument.security_id)
                .await
            {
                Some(ltp) => unrealized_pnl += tracker.pnl_at(ltp),
                None => unpriced += 1,
            }
        }

        let balance = self
            .ledger
            .available_balance(self.session.trading_day(now));

        telemetry::set_gauge(GaugeMetric::OpenPositions, active.len() as f64);
        telemetry::set_gauge(
            GaugeMetric::UnrealizedPnl,
            unrealized_pnl.to_f64().unwrap_or(0.0),
        );
        telemetry::set_gauge(GaugeMetric::LedgerBalance, balance.to_f64().unwrap_or(0.0));

        let report = HeartbeatReport {
            open_positions: active.len(),
            unpriced,
            unrealized_pnl,
            balance,
        };
        info!(
            open_positions = report.open_positions,
            unpriced = report.unpriced,
            unrealized_pnl = %report.unrealized_pnl,
            balance = %report.balance,
            "Heartbeat"
        );
        Ok(report)
    }
}

#[async_trait]
impl Worker for PositionHeartbeat {
    fn name(&self) -> &str {
        "position_heartbeat"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.beat(Utc::now()).await?;
        Ok(())
    }
}
