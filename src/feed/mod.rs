//! Price feed module
//!
//! Last-traded prices for open instruments. Tick ingestion itself lives
//! outside this crate; ticks arrive over a channel into the [`TickCache`].

mod cache;
mod types;

pub use cache::TickCache;
pub use types::PriceTick;

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for last-traded-price lookups
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest usable price, or `None` when missing or stale
    async fn last_traded_price(&self, exchange_segment: &str, security_id: &str)
        -> Option<Decimal>;
}
