//! Service wiring shared by the integration tests

use chrono::{DateTime, TimeZone, Utc};
use exit_guard::capital::{BalanceLedger, CapitalAllocator, InMemoryLedgerStore, LedgerStore};
use exit_guard::command::{
    CommandContext, CommandExecutor, EntryGuards, InMemoryAuditLog, PlaceOrderCommand,
    TrackedCommand,
};
use exit_guard::config::{BreakerConfig, Config, ExecutorConfig};
use exit_guard::events::MemorySink;
use exit_guard::execution::{PaperGateway, PlaceRequest};
use exit_guard::feed::{PriceTick, TickCache};
use exit_guard::monitor::{NoSignals, RiskMonitor};
use exit_guard::position::{
    ExitClaims, InMemoryPositionRepository, Instrument, PositionSide, PositionTracker,
    META_INDEX_KEY, META_MODE,
};
use exit_guard::risk::{CircuitBreaker, ExitEvaluator};
use exit_guard::session::SessionClock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const SEGMENT: &str = "NSE_FNO";
pub const SECURITY_ID: &str = "43210";

/// 11:00 IST
pub fn midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 5, 30, 0).unwrap()
}

pub struct Stack {
    pub config: Config,
    pub session: SessionClock,
    pub repository: Arc<InMemoryPositionRepository>,
    pub prices: Arc<TickCache>,
    pub ledger: Arc<BalanceLedger>,
    pub gateway: Arc<PaperGateway>,
    pub events: Arc<MemorySink>,
    pub audit: Arc<InMemoryAuditLog>,
    pub executor: Arc<CommandExecutor>,
    pub claims: ExitClaims,
    pub breaker: Arc<CircuitBreaker>,
}

impl Stack {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(InMemoryLedgerStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn LedgerStore>) -> Self {
        let session = SessionClock::from_config(&config.session);
        let ledger = Arc::new(BalanceLedger::new(store, config.capital.initial_balance));
        let events = Arc::new(MemorySink::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = Arc::new(CommandExecutor::new(
            audit.clone(),
            events.clone(),
            ExecutorConfig {
                max_retries: 3,
                backoff_base_ms: 1,
                gateway_timeout_ms: 1000,
            },
        ));
        Self {
            session,
            repository: Arc::new(InMemoryPositionRepository::new()),
            prices: Arc::new(TickCache::new(Duration::from_secs(60))),
            gateway: Arc::new(PaperGateway::new(ledger.clone(), session)),
            ledger,
            events,
            audit,
            executor,
            claims: ExitClaims::new(),
            breaker: Arc::new(CircuitBreaker::new()),
            config,
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

    pub fn monitor(&self) -> RiskMonitor {
        RiskMonitor::new(
            Arc::new(ExitEvaluator::from_config(&self.config)),
            self.ctx(),
            self.executor.clone(),
            Arc::new(NoSignals),
            self.breaker.clone(),
            BreakerConfig::default(),
            Duration::from_secs(1),
        )
    }

    pub fn allocator(&self) -> CapitalAllocator {
        CapitalAllocator::new(self.ledger.clone(), self.config.capital.clone(), self.session)
    }

    pub fn guards(&self) -> EntryGuards {
        EntryGuards {
            breaker: self.breaker.clone(),
            halt: None,
        }
    }

    pub fn tick(&self, ltp: Decimal) {
        self.prices.update(PriceTick::new(SEGMENT, SECURITY_ID, ltp));
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.session.trading_day(Utc::now())
    }

    pub fn balance(&self) -> Decimal {
        self.ledger.balance(self.today()).unwrap()
    }

    /// Place a NIFTY call entry through the command executor
    pub async fn enter(
        &self,
        quantity: u32,
        price: Decimal,
        guards: EntryGuards,
    ) -> Result<PositionTracker, exit_guard::command::CommandError> {
        let mut cmd = TrackedCommand::new(PlaceOrderCommand::new(
            self.ctx(),
            nifty_call(quantity, price),
            guards,
            75,
        ));
        self.executor
            .execute(&mut cmd)
            .await
            .map(|outcome| outcome.tracker)
    }
}

pub fn nifty_call(quantity: u32, price: Decimal) -> PlaceRequest {
    let mut metadata = HashMap::new();
    metadata.insert(META_INDEX_KEY.to_string(), "NIFTY".to_string());
    metadata.insert(META_MODE.to_string(), "paper".to_string());
    PlaceRequest {
        instrument: Instrument::new(SEGMENT, SECURITY_ID, "NIFTY24500CE"),
        side: PositionSide::LongCall,
        quantity,
        price,
        metadata,
    }
}
