//! Run command implementation

use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::capital::{BalanceLedger, InMemoryLedgerStore};
use crate::command::{AuditLog, CommandContext, CommandExecutor, InMemoryAuditLog, JsonlAuditLog};
use crate::config::{Config, ExecutionMode};
use crate::events::{EventBus, EventSink};
use crate::execution::create_gateway;
use crate::feed::TickCache;
use crate::monitor::{LedgerReconciler, NoSignals, PositionHeartbeat, RiskMonitor};
use crate::position::{ExitClaims, InMemoryPositionRepository};
use crate::risk::{CircuitBreaker, ExitEvaluator};
use crate::session::SessionClock;
use crate::supervisor::Supervisor;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if config.execution.mode != ExecutionMode::Paper {
            anyhow::bail!("only paper mode is supported by this binary");
        }

        let session = SessionClock::from_config(&config.session);
        let ledger = Arc::new(BalanceLedger::new(
            Arc::new(InMemoryLedgerStore::new()),
            config.capital.initial_balance,
        ));
        let repository = Arc::new(InMemoryPositionRepository::new());

        // Tick producers attach to this sender
        let (tick_tx, tick_rx) = mpsc::channel(1024);
        let prices = Arc::new(TickCache::new(Duration::from_secs(
            config.monitor.price_stale_secs,
        )));
        let ingest = prices.spawn_ingest(tick_rx);

        let gateway = create_gateway(&config.execution, ledger.clone(), session)?;
        let bus = Arc::new(EventBus::default());
        let event_log = spawn_event_log(bus.subscribe());

        let audit: Arc<dyn AuditLog> = match &config.monitor.audit_log_path {
            Some(path) => {
                info!(path = %path.display(), "Command audit log");
                Arc::new(JsonlAuditLog::new(path))
            }
            None => Arc::new(InMemoryAuditLog::new()),
        };
        let events: Arc<dyn EventSink> = bus.clone();
        let executor = Arc::new(CommandExecutor::new(
            audit,
            events.clone(),
            config.executor.clone(),
        ));

        let ctx = CommandContext {
            repository: repository.clone(),
            prices: prices.clone(),
            gateway,
            events,
            claims: ExitClaims::new(),
        };
        let monitor = Arc::new(RiskMonitor::new(
            Arc::new(ExitEvaluator::from_config(config)),
            ctx,
            executor,
            Arc::new(NoSignals),
            Arc::new(CircuitBreaker::new()),
            config.breaker.clone(),
            Duration::from_secs(config.monitor.interval_secs),
        ));
        let heartbeat = Arc::new(PositionHeartbeat::new(
            repository.clone(),
            prices.clone(),
            ledger.clone(),
            session,
            Duration::from_secs(config.monitor.heartbeat_interval_secs),
        ));
        let reconciler = Arc::new(LedgerReconciler::new(
            repository,
            ledger,
            session,
            true,
            Duration::from_secs(config.monitor.reconcile_interval_secs),
        ));

        let supervisor = Supervisor::new(Duration::from_secs(config.monitor.shutdown_grace_secs));
        supervisor.register(monitor)?;
        supervisor.register(heartbeat)?;
        supervisor.register(reconciler)?;

        for (name, e) in supervisor.start_all().await {
            warn!(worker = %name, error = %e, "Continuing without worker");
        }
        info!(workers = ?supervisor.names(), "Exit guard running");

        match self.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => tokio::signal::ctrl_c().await?,
        }
        info!("Shutting down");

        for (name, outcome) in supervisor.stop_all().await {
            info!(worker = %name, ?outcome, "Worker stopped");
        }
        drop(tick_tx);
        if let Err(e) = ingest.await {
            error!(error = %e, "Tick ingestion task failed");
        }
        drop(bus);
        event_log.abort();
        Ok(())
    }
}

fn spawn_event_log(
    mut rx: broadcast::Receiver<crate::events::DomainEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(kind = event.kind(), event = %json, "Domain event"),
                    Err(e) => warn!(error = %e, "Unserializable event"),
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event log lagging")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
