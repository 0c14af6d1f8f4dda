//! Paper balance ledger
//!
//! One entry per trading day. Every read-modify-write for a day runs under
//! that day's mutex; the balance is clamped at zero.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{LedgerEntry, LedgerError};
use crate::position::{PositionStatus, PositionTracker};

/// Storage for ledger entries
pub trait LedgerStore: Send + Sync {
    fn load(&self, day: NaiveDate) -> Result<Option<LedgerEntry>, LedgerError>;
    fn save(&self, entry: LedgerEntry) -> Result<(), LedgerError>;
}

/// In-process ledger storage; lost on restart
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    entries: DashMap<NaiveDate, LedgerEntry>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self, day: NaiveDate) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.entries.get(&day).map(|e| e.value().clone()))
    }

    fn save(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.entries.insert(entry.day, entry);
        Ok(())
    }
}

/// Per-day paper balance
pub struct BalanceLedger {
    store: Arc<dyn LedgerStore>,
    initial_capital: Decimal,
    locks: DashMap<NaiveDate, Arc<Mutex<()>>>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn LedgerStore>, initial_capital: Decimal) -> Self {
        Self {
            store,
            initial_capital,
            locks: DashMap::new(),
        }
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    fn lock_for(&self, day: NaiveDate) -> Arc<Mutex<()>> {
        // Clone out of the map so the shard lock is released before we block
        self.locks
            .entry(day)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Caller must hold the day lock
    fn load_or_open(&self, day: NaiveDate) -> Result<LedgerEntry, LedgerError> {
        if let Some(entry) = self.store.load(day)? {
            return Ok(entry);
        }
        let entry = LedgerEntry::open(day, self.initial_capital);
        self.store.save(entry.clone())?;
        info!(%day, balance = %entry.balance, "Opened ledger day");
        Ok(entry)
    }

    /// Entry for `day`, initialized from the configured capital if absent
    pub fn ensure_day(&self, day: NaiveDate) -> Result<LedgerEntry, LedgerError> {
        let lock = self.lock_for(day);
        let _guard = lock.lock();
        self.load_or_open(day)
    }

    pub fn balance(&self, day: NaiveDate) -> Result<Decimal, LedgerError> {
        Ok(self.ensure_day(day)?.balance)
    }

    /// Balance, or zero when the ledger cannot be read
    pub fn available_balance(&self, day: NaiveDate) -> Decimal {
        match self.balance(day) {
            Ok(balance) => balance,
            Err(e) => {
                warn!(%day, error = %e, "Ledger unavailable, reporting zero balance");
                Decimal::ZERO
            }
        }
    }

    pub fn initial_balance(&self, day: NaiveDate) -> Result<Decimal, LedgerError> {
        Ok(self.ensure_day(day)?.initial_balance)
    }

    /// Subtract `amount`; the balance is clamped at zero
    pub fn debit(&self, day: NaiveDate, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.adjust(day, -Self::non_negative(amount)?)
    }

    /// Subtract `amount` only if the balance covers it
    ///
    /// The check and the write share one hold of the day lock, so two
    /// concurrent debits can never both pass against the same balance.
    pub fn try_debit(&self, day: NaiveDate, amount: Decimal) -> Result<Decimal, LedgerError> {
        let amount = Self::non_negative(amount)?;
        self.with_entry(day, |entry| {
            if amount > entry.balance {
                return Err(LedgerError::InsufficientBalance {
                    required: amount,
                    available: entry.balance,
                });
            }
            entry.balance -= amount;
            Ok(())
        })
    }

    pub fn credit(&self, day: NaiveDate, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.adjust(day, Self::non_negative(amount)?)
    }

    fn non_negative(amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount < Decimal::ZERO {
            Err(LedgerError::NegativeAmount(amount))
        } else {
            Ok(amount)
        }
    }

    fn adjust(&self, day: NaiveDate, delta: Decimal) -> Result<Decimal, LedgerError> {
        self.with_entry(day, |entry| {
            let target = entry.balance + delta;
            if target < Decimal::ZERO {
                warn!(%day, balance = %entry.balance, %delta, "Debit exceeds balance, clamping at zero");
            }
            entry.balance = target.max(Decimal::ZERO);
            Ok(())
        })
    }

    /// Read-modify-write of one day under its lock; returns the new balance
    fn with_entry<F>(&self, day: NaiveDate, update: F) -> Result<Decimal, LedgerError>
    where
        F: FnOnce(&mut LedgerEntry) -> Result<(), LedgerError>,
    {
        let lock = self.lock_for(day);
        let _guard = lock.lock();

        let mut entry = self.load_or_open(day)?;
        update(&mut entry)?;
        entry.updated_at = Utc::now();
        let balance = entry.balance;
        self.store.save(entry)?;
        Ok(balance)
    }

    /// Rebuild a day's balance from the trackers opened that day
    ///
    /// Open trackers hold their entry cost; closed trackers contribute their
    /// realized P&L.
    pub fn rederive(
        &self,
        day: NaiveDate,
        initial: Decimal,
        trackers: &[PositionTracker],
    ) -> Result<Decimal, LedgerError> {
        let lock = self.lock_for(day);
        let _guard = lock.lock();

        let mut entry = LedgerEntry::open(day, initial);
        entry.balance = derive_balance(initial, trackers);
        let balance = entry.balance;
        self.store.save(entry)?;
        info!(%day, %balance, trackers = trackers.len(), "Ledger rederived");
        Ok(balance)
    }
}

/// Balance implied by a day's trackers, floored at zero
pub fn derive_balance(initial: Decimal, trackers: &[PositionTracker]) -> Decimal {
    let committed: Decimal = trackers
        .iter()
        .filter(|t| t.status == PositionStatus::Active)
        .map(PositionTracker::entry_cost)
        .sum();
    let realized: Decimal = trackers.iter().filter_map(|t| t.realized_pnl).sum();
    (initial - committed + realized).max(Decimal::ZERO)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::position::fixtures::active;
    use crate::position::{ExitReason, PositionSide};
    use rust_decimal_macros::dec;

    /// Store that fails every call
    pub struct FailingStore;

    impl LedgerStore for FailingStore {
        fn load(&self, _day: NaiveDate) -> Result<Option<LedgerEntry>, LedgerError> {
            Err(LedgerError::Unavailable("store offline".into()))
        }

        fn save(&self, _entry: LedgerEntry) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("store offline".into()))
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn ledger() -> BalanceLedger {
        BalanceLedger::new(Arc::new(InMemoryLedgerStore::new()), dec!(100000))
    }

    #[test]
    fn test_day_opens_with_initial_capital() {
        let ledger = ledger();
        let entry = ledger.ensure_day(day()).unwrap();
        assert_eq!(entry.initial_balance, dec!(100000));
        assert_eq!(entry.balance, dec!(100000));
        assert_eq!(ledger.balance(day()).unwrap(), dec!(100000));
    }

    #[test]
    fn test_debit_and_credit() {
        let ledger = ledger();
        assert_eq!(ledger.debit(day(), dec!(7500)).unwrap(), dec!(92500));
        assert_eq!(ledger.credit(day(), dec!(8250)).unwrap(), dec!(100750));
        assert_eq!(ledger.initial_balance(day()).unwrap(), dec!(100000));
    }

    #[test]
    fn test_balance_never_negative() {
        let ledger = ledger();
        assert_eq!(ledger.debit(day(), dec!(250000)).unwrap(), dec!(0));
        assert_eq!(ledger.balance(day()).unwrap(), dec!(0));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let ledger = ledger();
        assert_eq!(
            ledger.credit(day(), dec!(-5)),
            Err(LedgerError::NegativeAmount(dec!(-5)))
        );
        assert_eq!(ledger.balance(day()).unwrap(), dec!(100000));
    }

    #[test]
    fn test_days_are_independent() {
        let ledger = ledger();
        let next = day().succ_opt().unwrap();
        ledger.debit(day(), dec!(1000)).unwrap();
        assert_eq!(ledger.balance(next).unwrap(), dec!(100000));
    }

    #[test]
    fn test_available_balance_fails_closed() {
        let ledger = BalanceLedger::new(Arc::new(FailingStore), dec!(100000));
        assert!(ledger.balance(day()).is_err());
        assert_eq!(ledger.available_balance(day()), dec!(0));
    }

    #[test]
    fn test_concurrent_debits_serialize() {
        let ledger = Arc::new(ledger());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        ledger.debit(day(), dec!(100)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // 16 * 50 * 100 = 80000
        assert_eq!(ledger.balance(day()).unwrap(), dec!(20000));
    }

    #[test]
    fn test_try_debit_refuses_overdraft() {
        let ledger = ledger();
        assert_eq!(ledger.try_debit(day(), dec!(60000)).unwrap(), dec!(40000));
        assert_eq!(
            ledger.try_debit(day(), dec!(40001)),
            Err(LedgerError::InsufficientBalance {
                required: dec!(40001),
                available: dec!(40000),
            })
        );
        assert_eq!(ledger.balance(day()).unwrap(), dec!(40000));
        assert_eq!(ledger.try_debit(day(), dec!(40000)).unwrap(), dec!(0));
    }

    #[test]
    fn test_concurrent_try_debits_never_overdraw() {
        let ledger = Arc::new(BalanceLedger::new(
            Arc::new(InMemoryLedgerStore::new()),
            dec!(10000),
        ));
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    ledger.try_debit(day(), dec!(3000)).is_ok()
                })
            })
            .collect();
        let filled = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(filled, 3);
        assert_eq!(ledger.balance(day()).unwrap(), dec!(1000));
    }

    #[test]
    fn test_rederive_from_trackers() {
        let ledger = ledger();
        ledger.debit(day(), dec!(99999)).unwrap();

        let open = active(PositionSide::LongCall, 75, dec!(100));
        let mut closed = active(PositionSide::LongCall, 50, dec!(100));
        closed.record_exit(dec!(120), ExitReason::TakeProfit, Utc::now());
        closed.status = PositionStatus::Exited;

        let balance = ledger
            .rederive(day(), dec!(100000), &[open, closed])
            .unwrap();
        // 100000 - 7500 + 1000
        assert_eq!(balance, dec!(93500));
        assert_eq!(ledger.balance(day()).unwrap(), dec!(93500));
    }
}
