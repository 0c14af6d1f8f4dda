//! Capital module
//!
//! Band-based entry sizing and the per-day paper balance ledger

mod allocator;
mod ledger;
mod types;

pub use allocator::{quantity_for, select_band, CapitalAllocator, MAX_LOTS};
pub use ledger::{derive_balance, BalanceLedger, InMemoryLedgerStore, LedgerStore};
pub use types::{LedgerEntry, LedgerError};

#[cfg(test)]
pub(crate) use ledger::tests::FailingStore;
