//! Entry through monitor-driven exit

use crate::common::{midday, Stack};
use chrono::Utc;
use exit_guard::command::{AuditLog, ExitPositionCommand, TrackedCommand};
use exit_guard::config::Config;
use exit_guard::events::DomainEvent;
use exit_guard::position::{ExitReason, PositionRepository, PositionStatus};
use exit_guard::risk::TradingHaltGate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_peak_drawdown_exit_settles_ledger() {
    let stack = Stack::new(Config::default());
    let quantity = stack
        .allocator()
        .quantity_for_index("NIFTY", dec!(100), Utc::now());
    assert!(quantity > 0);
    assert_eq!(quantity % 75, 0);

    let tracker = stack
        .enter(quantity, dec!(100), stack.guards())
        .await
        .unwrap();
    let qty = Decimal::from(quantity);
    assert_eq!(stack.balance(), dec!(100000) - dec!(100) * qty);

    let monitor = stack.monitor();
    for ltp in [dec!(110), dec!(107)] {
        stack.tick(ltp);
        let report = monitor.tick(midday()).await.unwrap();
        assert_eq!(report.exits_dispatched, 0);
    }
    let marked = stack.repository.get(tracker.id).await.unwrap().unwrap();
    assert_eq!(marked.high_water_mark_pct, dec!(10));

    stack.tick(dec!(102.9));
    let report = monitor.tick(midday()).await.unwrap();
    assert_eq!(report.exits_dispatched, 1);
    monitor.wait_for_exits().await;

    let exited = stack.repository.get(tracker.id).await.unwrap().unwrap();
    assert_eq!(exited.status, PositionStatus::Exited);
    assert_eq!(exited.exit_reason, Some(ExitReason::PeakDrawdown));
    assert_eq!(exited.realized_pnl, Some(dec!(2.9) * qty));
    assert_eq!(stack.balance(), dec!(100000) + dec!(2.9) * qty);

    let exits: Vec<_> = stack
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::ExitTriggered { .. }))
        .collect();
    assert_eq!(exits.len(), 1);
    assert_eq!(stack.events.count("command_executed"), 2);
}

#[tokio::test]
async fn test_concurrent_monitors_exit_once() {
    let stack = Stack::new(Config::default());
    let tracker = stack.enter(75, dec!(100), stack.guards()).await.unwrap();
    stack.tick(dec!(60));

    let first = stack.monitor();
    let second = stack.monitor();
    let (a, b) = tokio::join!(first.tick(midday()), second.tick(midday()));
    assert!(a.unwrap().exits_dispatched + b.unwrap().exits_dispatched >= 1);
    first.wait_for_exits().await;
    second.wait_for_exits().await;

    // One entry fill and exactly one exit fill
    assert_eq!(stack.gateway.fills().await.len(), 2);
    let exited = stack.repository.get(tracker.id).await.unwrap().unwrap();
    assert_eq!(exited.status, PositionStatus::Exited);
    assert_eq!(exited.exit_reason, Some(ExitReason::HardStopLoss));
    assert_eq!(stack.claims.in_flight(), 0);
}

#[tokio::test]
async fn test_exit_is_audited() {
    let stack = Stack::new(Config::default());
    let tracker = stack.enter(75, dec!(100), stack.guards()).await.unwrap();
    stack.tick(dec!(201));

    let monitor = stack.monitor();
    monitor.tick(midday()).await.unwrap();
    monitor.wait_for_exits().await;

    let command_id = stack
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DomainEvent::CommandExecuted {
                command_id, kind, ..
            } if kind == "exit_position" => Some(command_id),
            _ => None,
        })
        .next()
        .unwrap();
    let trail = stack.audit.entries_for(command_id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(
        trail[0].metadata.get("tracker_id"),
        Some(&tracker.id.to_string())
    );
    assert_eq!(trail[0].metadata.get("reason").map(String::as_str), Some("take_profit"));
}

#[tokio::test]
async fn test_profitable_day_engages_halt_gate() {
    let mut config = Config::default();
    config.halt.profit_threshold_pct = dec!(1);
    let stack = Stack::new(config.clone());
    let halt = Arc::new(TradingHaltGate::new(
        stack.repository.clone(),
        stack.ledger.clone(),
        config.halt.clone(),
        stack.session,
    ));

    // 150 * 20 = 3000 realized, 3% of the day's capital
    stack.enter(150, dec!(100), stack.guards()).await.unwrap();
    stack.tick(dec!(120));
    let mut guards = stack.guards();
    guards.halt = Some(halt.clone());

    let tracker = stack
        .repository
        .list_by_status(PositionStatus::Active)
        .await
        .unwrap()
        .remove(0);
    let mut exit = TrackedCommand::new(ExitPositionCommand::new(
        stack.ctx(),
        tracker.id,
        ExitReason::Manual,
        None,
    ));
    stack.executor.execute(&mut exit).await.unwrap();

    assert!(!halt.can_trade(None).await.allowed);
    assert!(!halt.can_trade(Some(dec!(0.5))).await.allowed);
    assert!(halt.can_trade(Some(dec!(0.7))).await.allowed);
    assert!(stack.enter(75, dec!(100), guards).await.is_err());
}
