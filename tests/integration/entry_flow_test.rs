//! Entries: sizing, averaging, guards and undo

use crate::common::{nifty_call, Stack};
use chrono::{NaiveDate, Utc};
use exit_guard::capital::{LedgerEntry, LedgerError, LedgerStore};
use exit_guard::command::{CommandError, CommandStatus, FailureKind, PlaceOrderCommand, TrackedCommand};
use exit_guard::config::Config;
use exit_guard::position::{PositionRepository, PositionStatus};
use rust_decimal_macros::dec;
use std::sync::Arc;

struct DownStore;

impl LedgerStore for DownStore {
    fn load(&self, _day: NaiveDate) -> Result<Option<LedgerEntry>, LedgerError> {
        Err(LedgerError::Unavailable("connection refused".into()))
    }

    fn save(&self, _entry: LedgerEntry) -> Result<(), LedgerError> {
        Err(LedgerError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_repeat_entries_average_into_one_position() {
    let stack = Stack::new(Config::default());
    let first = stack.enter(75, dec!(100), stack.guards()).await.unwrap();
    let second = stack.enter(150, dec!(130), stack.guards()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 225);
    assert_eq!(second.average_price, dec!(120));
    assert_eq!(second.entry_price, dec!(100));

    let active = stack
        .repository
        .list_by_status(PositionStatus::Active)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(stack.balance(), dec!(100000) - dec!(7500) - dec!(19500));
}

#[tokio::test]
async fn test_unaffordable_entry_is_not_retried() {
    let stack = Stack::new(Config::default());
    let mut cmd = TrackedCommand::new(PlaceOrderCommand::new(
        stack.ctx(),
        nifty_call(1500, dec!(100)),
        stack.guards(),
        75,
    ));

    let err = stack.executor.execute_with_retry(&mut cmd).await.unwrap_err();
    match err {
        CommandError::Failed(failure) => assert_eq!(failure.kind, FailureKind::Validation),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(cmd.record.retry_count, 0);
    assert_eq!(stack.events.count("risk_alert"), 1);
    assert_eq!(stack.balance(), dec!(100000));
}

#[tokio::test]
async fn test_tripped_breaker_blocks_until_reset() {
    let stack = Stack::new(Config::default());
    stack
        .breaker
        .trip("manual halt", Some(chrono::Duration::minutes(30)));

    let status = stack.breaker.status(Utc::now());
    assert!(status.tripped);
    assert_eq!(status.reason.as_deref(), Some("manual halt"));
    assert!(stack.enter(75, dec!(100), stack.guards()).await.is_err());

    stack.breaker.reset();
    assert!(stack.enter(75, dec!(100), stack.guards()).await.is_ok());
}

#[tokio::test]
async fn test_undo_cancels_entry_and_restores_balance() {
    let stack = Stack::new(Config::default());
    let mut cmd = TrackedCommand::new(PlaceOrderCommand::new(
        stack.ctx(),
        nifty_call(75, dec!(100)),
        stack.guards(),
        75,
    ));
    let outcome = stack.executor.execute(&mut cmd).await.unwrap();

    stack.executor.undo(&mut cmd).await.unwrap();
    assert_eq!(cmd.status(), CommandStatus::Undone);

    let cancelled = stack
        .repository
        .get(outcome.tracker.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, PositionStatus::Cancelled);
    assert_eq!(stack.balance(), dec!(100000));
}

#[tokio::test]
async fn test_sizing_fails_closed_without_ledger() {
    let stack = Stack::with_store(Config::default(), Arc::new(DownStore));

    let quantity = stack
        .allocator()
        .quantity_for_index("NIFTY", dec!(100), Utc::now());
    assert_eq!(quantity, 0);
    assert_eq!(stack.ledger.available_balance(stack.today()), dec!(0));
}
