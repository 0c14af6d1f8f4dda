//! In-memory tick cache

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::types::PriceTick;
use super::PriceSource;

/// Latest tick per instrument, keyed by (segment, security id)
pub struct TickCache {
    ticks: DashMap<(String, String), PriceTick>,
    stale_after: Duration,
}

impl TickCache {
    /// Create a cache that treats ticks older than `stale_after` as missing
    pub fn new(stale_after: std::time::Duration) -> Self {
        Self {
            ticks: DashMap::new(),
            stale_after: Duration::from_std(stale_after).unwrap_or_else(|_| Duration::days(1)),
        }
    }

    /// Store a tick; older ticks never replace newer ones
    pub fn update(&self, tick: PriceTick) {
        let key = (tick.exchange_segment.clone(), tick.security_id.clone());
        let mut entry = self.ticks.entry(key).or_insert_with(|| tick.clone());
        if tick.timestamp >= entry.timestamp {
            *entry = tick;
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Latest tick regardless of age
    pub fn latest(&self, exchange_segment: &str, security_id: &str) -> Option<PriceTick> {
        self.ticks
            .get(&(exchange_segment.to_string(), security_id.to_string()))
            .map(|t| t.value().clone())
    }

    /// Drain a tick channel into the cache until the sender closes
    pub fn spawn_ingest(self: &Arc<Self>, mut rx: mpsc::Receiver<PriceTick>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            info!("Tick ingestion started");
            while let Some(tick) = rx.recv().await {
                debug!(
                    segment = %tick.exchange_segment,
                    security_id = %tick.security_id,
                    ltp = %tick.ltp,
                    "Tick"
                );
                cache.update(tick);
            }
            info!("Tick channel closed");
        })
    }
}

#[async_trait]
impl PriceSource for TickCache {
    async fn last_traded_price(
        &self,
        exchange_segment: &str,
        security_id: &str,
    ) -> Option<Decimal> {
        let tick = self.latest(exchange_segment, security_id)?;
        if Utc::now() - tick.timestamp > self.stale_after || tick.ltp <= Decimal::ZERO {
            return None;
        }
        Some(tick.ltp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cache() -> TickCache {
        TickCache::new(std::time::Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_latest_price() {
        let cache = cache();
        cache.update(PriceTick::new("NSE_FNO", "43210", dec!(101.5)));
        cache.update(PriceTick::new("NSE_FNO", "43210", dec!(102.0)));

        assert_eq!(
            cache.last_traded_price("NSE_FNO", "43210").await,
            Some(dec!(102.0))
        );
        assert_eq!(cache.last_traded_price("BSE_FNO", "43210").await, None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_tick_is_missing() {
        let cache = cache();
        let mut tick = PriceTick::new("NSE_FNO", "43210", dec!(100));
        tick.timestamp = Utc::now() - Duration::seconds(120);
        cache.update(tick);

        assert_eq!(cache.last_traded_price("NSE_FNO", "43210").await, None);
        assert!(cache.latest("NSE_FNO", "43210").is_some());
    }

    #[tokio::test]
    async fn test_out_of_order_tick_ignored() {
        let cache = cache();
        cache.update(PriceTick::new("NSE_FNO", "43210", dec!(105)));
        let mut old = PriceTick::new("NSE_FNO", "43210", dec!(99));
        old.timestamp = Utc::now() - Duration::seconds(5);
        cache.update(old);

        assert_eq!(
            cache.last_traded_price("NSE_FNO", "43210").await,
            Some(dec!(105))
        );
    }

    #[tokio::test]
    async fn test_ingest_from_channel() {
        let cache = Arc::new(cache());
        let (tx, rx) = mpsc::channel(16);
        let handle = cache.spawn_ingest(rx);

        tx.send(PriceTick::new("NSE_FNO", "1", dec!(50))).await.unwrap();
        tx.send(PriceTick::new("NSE_FNO", "2", dec!(60))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.last_traded_price("NSE_FNO", "2").await, Some(dec!(60)));
    }
}
