//! Capital-band position sizing
//!
//! Sizes new entries from the current balance. The balance selects a band
//! (allocation and risk percentages); the lot count is bounded both by what
//! the allocation can buy and by how many lots the risk budget covers at the
//! assumed stop distance.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ledger::BalanceLedger;
use crate::config::{CapitalBand, CapitalConfig, IndexPolicy};
use crate::session::SessionClock;

/// Hard cap on lots per entry
pub const MAX_LOTS: u64 = 100;

/// First band whose inclusive upper bound covers `balance`
///
/// A band without an upper bound matches everything; when no band matches the
/// last band is used.
pub fn select_band(bands: &[CapitalBand], balance: Decimal) -> Option<&CapitalBand> {
    bands
        .iter()
        .find(|band| band.upper_bound.map(|ub| balance <= ub).unwrap_or(true))
        .or_else(|| bands.last())
}

/// Lot-aligned quantity to buy at `entry_price`
///
/// Returns 0 when any input is non-positive or one lot is unaffordable.
/// Otherwise at least one lot and at most [`MAX_LOTS`].
pub fn quantity_for(
    balance: Decimal,
    entry_price: Decimal,
    lot_size: u32,
    bands: &[CapitalBand],
    policy: &IndexPolicy,
) -> u32 {
    if balance <= Decimal::ZERO || entry_price <= Decimal::ZERO || lot_size == 0 {
        return 0;
    }
    let Some(band) = select_band(bands, balance) else {
        return 0;
    };

    let lot = Decimal::from(lot_size);
    let lot_cost = entry_price * lot;
    if lot_cost > balance {
        return 0;
    }

    let allocation = balance * band.alloc_pct / dec!(100) * policy.scale_multiplier;
    let mut lots = whole_lots(allocation / lot_cost);

    let risk_per_lot = entry_price * policy.stop_distance_pct / dec!(100) * lot;
    if risk_per_lot > Decimal::ZERO {
        let risk_capital = balance * band.risk_pct / dec!(100);
        lots = lots.min(whole_lots(risk_capital / risk_per_lot));
    }

    let mut lots = lots.max(1).min(MAX_LOTS);
    while lots > 0 && Decimal::from(lots) * lot_cost > balance {
        lots -= 1;
    }

    debug!(
        %balance,
        %entry_price,
        lot_size,
        alloc_pct = %band.alloc_pct,
        risk_pct = %band.risk_pct,
        lots,
        "Sized entry"
    );
    u32::try_from(lots * u64::from(lot_size)).unwrap_or(0)
}

fn whole_lots(value: Decimal) -> u64 {
    if value <= Decimal::ZERO {
        return 0;
    }
    value.floor().to_u64().unwrap_or(u64::MAX)
}

/// Sizes entries against the current trading day's ledger balance
pub struct CapitalAllocator {
    ledger: Arc<BalanceLedger>,
    config: CapitalConfig,
    session: SessionClock,
}

impl CapitalAllocator {
    pub fn new(ledger: Arc<BalanceLedger>, config: CapitalConfig, session: SessionClock) -> Self {
        Self {
            ledger,
            config,
            session,
        }
    }

    pub fn policy_for(&self, index_key: &str) -> &IndexPolicy {
        self.config.policy_for(index_key)
    }

    /// Quantity for an entry on `index_key`; 0 if the balance cannot be read
    pub fn quantity_for_index(
        &self,
        index_key: &str,
        entry_price: Decimal,
        now: DateTime<Utc>,
    ) -> u32 {
        let day = self.session.trading_day(now);
        let balance = match self.ledger.balance(day) {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, index_key, "Ledger unavailable, refusing to size entry");
                return 0;
            }
        };
        let policy = self.config.policy_for(index_key);
        quantity_for(
            balance,
            entry_price,
            policy.lot_size,
            &self.config.bands,
            policy,
        )
    }
}
