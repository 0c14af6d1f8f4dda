//! Shared wiring for command and monitor tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CommandContext, CommandExecutor, InMemoryAuditLog};
use crate::capital::{BalanceLedger, InMemoryLedgerStore};
use crate::config::ExecutorConfig;
use crate::events::MemorySink;
use crate::execution::{GatewayError, OrderAck, OrderGateway, PaperGateway, PlaceRequest};
use crate::feed::{PriceTick, TickCache};
use crate::position::fixtures::fill;
use crate::position::{
    EntryFill, ExitClaims, InMemoryPositionRepository, PositionMarks, PositionRepository,
    PositionSide, PositionStatus, PositionTracker, RepositoryError, TrackerPatch,
};
use crate::session::SessionClock;

/// Paper gateway that can be told to fail or stall exits
pub struct ScriptedGateway {
    inner: PaperGateway,
    exit_failures: AtomicU32,
    exit_delay: Option<Duration>,
    pub exit_calls: AtomicU32,
    pub place_calls: AtomicU32,
}

impl ScriptedGateway {
    pub fn new(ledger: Arc<BalanceLedger>) -> Self {
        Self {
            inner: PaperGateway::new(ledger, SessionClock::default()),
            exit_failures: AtomicU32::new(0),
            exit_delay: None,
            exit_calls: AtomicU32::new(0),
            place_calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` exits with a transient error
    pub fn fail_exits(&self, n: u32) {
        self.exit_failures.store(n, Ordering::SeqCst);
    }

    pub fn with_exit_delay(mut self, delay: Duration) -> Self {
        self.exit_delay = Some(delay);
        self
    }

    pub fn exits(&self) -> u32 {
        self.exit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn exit_market(
        &self,
        tracker: &PositionTracker,
        reference_price: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        self.exit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.exit_delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .exit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GatewayError::Unavailable("broker timeout".into()));
        }
        self.inner.exit_market(tracker, reference_price).await
    }

    async fn place_market(&self, request: &PlaceRequest) -> Result<OrderAck, GatewayError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.place_market(request).await
    }

    fn mode_name(&self) -> &'static str {
        "paper"
    }
}

/// Repository whose `get` snapshots the tracker, then stalls before returning it
pub struct SlowReads {
    inner: Arc<dyn PositionRepository>,
    delay: Duration,
}

impl SlowReads {
    pub fn new(inner: Arc<dyn PositionRepository>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl PositionRepository for SlowReads {
    async fn insert(&self, tracker: PositionTracker) -> Result<(), RepositoryError> {
        self.inner.insert(tracker).await
    }

    async fn get(&self, id: uuid::Uuid) -> Result<Option<PositionTracker>, RepositoryError> {
        let snapshot = self.inner.get(id).await;
        tokio::time::sleep(self.delay).await;
        snapshot
    }

    async fn find_active(
        &self,
        segment: &str,
        security_id: &str,
    ) -> Result<Option<PositionTracker>, RepositoryError> {
        self.inner.find_active(segment, security_id).await
    }

    async fn list_by_status(
        &self,
        status: PositionStatus,
    ) -> Result<Vec<PositionTracker>, RepositoryError> {
        self.inner.list_by_status(status).await
    }

    async fn list_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PositionTracker>, RepositoryError> {
        self.inner.list_since(since).await
    }

    async fn transition(
        &self,
        id: uuid::Uuid,
        from: PositionStatus,
        to: PositionStatus,
        patch: Option<TrackerPatch>,
    ) -> Result<PositionTracker, RepositoryError> {
        self.inner.transition(id, from, to, patch).await
    }

    async fn update_marks(
        &self,
        id: uuid::Uuid,
        marks: &PositionMarks,
        at: DateTime<Utc>,
    ) -> Result<PositionTracker, RepositoryError> {
        self.inner.update_marks(id, marks, at).await
    }

    async fn record_fill(&self, fill: EntryFill) -> Result<PositionTracker, RepositoryError> {
        self.inner.record_fill(fill).await
    }

    async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal, RepositoryError> {
        self.inner.realized_pnl_since(since).await
    }
}

pub struct Harness {
    pub repository: Arc<InMemoryPositionRepository>,
    pub prices: Arc<TickCache>,
    pub gateway: Arc<ScriptedGateway>,
    pub ledger: Arc<BalanceLedger>,
    pub events: Arc<MemorySink>,
    pub audit: Arc<InMemoryAuditLog>,
    pub claims: ExitClaims,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(BalanceLedger::new(
            Arc::new(InMemoryLedgerStore::new()),
            dec!(100000),
        ));
        let gateway = ScriptedGateway::new(ledger.clone());
        Self::with_gateway(ledger, gateway)
    }

    pub fn with_gateway(ledger: Arc<BalanceLedger>, gateway: ScriptedGateway) -> Self {
        Self {
            repository: Arc::new(InMemoryPositionRepository::new()),
            prices: Arc::new(TickCache::new(Duration::from_secs(60))),
            gateway: Arc::new(gateway),
            ledger,
            events: Arc::new(MemorySink::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            claims: ExitClaims::new(),
        }
    }

    pub fn ctx(&self) -> CommandContext {
        CommandContext {
            repository: self.repository.clone(),
            prices: self.prices.clone(),
            gateway: self.gateway.clone(),
            events: self.events.clone(),
            claims: self.claims.clone(),
        }
    }

    pub fn executor(&self) -> CommandExecutor {
        CommandExecutor::new(
            self.audit.clone(),
            self.events.clone(),
            ExecutorConfig {
                max_retries: 3,
                backoff_base_ms: 1,
                gateway_timeout_ms: 500,
            },
        )
    }

    /// Open a fixture position directly in the repository
    pub async fn seed(&self, side: PositionSide, quantity: u32, price: Decimal) -> PositionTracker {
        self.repository
            .record_fill(fill(side, quantity, price))
            .await
            .unwrap()
    }

    /// Publish an LTP for the fixture contract
    pub fn tick(&self, ltp: Decimal) {
        self.prices.update(PriceTick::new("NSE_FNO", "43210", ltp));
    }

    pub fn balance(&self) -> Decimal {
        self.ledger
            .balance(SessionClock::default().trading_day(Utc::now()))
            .unwrap()
    }
}
