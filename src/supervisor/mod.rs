//! Worker supervisor
//!
//! Named background workers, each on its own fixed-interval loop. A worker
//! sees its stop flag at the top of every iteration and gets a bounded grace
//! period to finish before it is aborted.

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// A periodic background task
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Time between ticks
    fn interval(&self) -> Duration;

    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// One iteration; an error is logged and the loop continues
    async fn tick(&self) -> anyhow::Result<()>;

    /// Runs once after the loop exits on a graceful stop
    async fn on_stop(&self) {}
}

/// How a worker came to a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Graceful,
    /// The grace period ran out and the task was aborted
    Forced,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Worker already registered: {0}")]
    Duplicate(String),
    #[error("Unknown worker: {0}")]
    NotFound(String),
    #[error("Worker already running: {0}")]
    AlreadyRunning(String),
    #[error("Worker not running: {0}")]
    NotRunning(String),
    #[error("Worker {name} failed to start: {reason}")]
    StartFailed { name: String, reason: String },
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Slot {
    worker: Arc<dyn Worker>,
    running: Option<Running>,
}

/// Registry and lifecycle owner of background workers
pub struct Supervisor {
    slots: Mutex<HashMap<String, Slot>>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            grace,
        }
    }

    pub fn register(&self, worker: Arc<dyn Worker>) -> Result<(), SupervisorError> {
        let name = worker.name().to_string();
        let mut slots = self.slots.lock();
        if slots.contains_key(&name) {
            return Err(SupervisorError::Duplicate(name));
        }
        info!(worker = %name, "Worker registered");
        slots.insert(
            name,
            Slot {
                worker,
                running: None,
            },
        );
        Ok(())
    }

    /// Registered worker names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.slots
            .lock()
            .get(name)
            .and_then(|slot| slot.running.as_ref())
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub async fn start(&self, name: &str) -> Result<(), SupervisorError> {
        let worker = {
            let slots = self.slots.lock();
            let slot = slots
                .get(name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
            if slot.running.is_some() {
                return Err(SupervisorError::AlreadyRunning(name.to_string()));
            }
            slot.worker.clone()
        };

        worker
            .on_start()
            .await
            .map_err(|e| SupervisorError::StartFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(worker, stop_rx));

        let mut slots = self.slots.lock();
        match slots.get_mut(name) {
            Some(slot) if slot.running.is_none() => {
                slot.running = Some(Running { stop_tx, handle });
                info!(worker = %name, "Worker started");
                Ok(())
            }
            _ => {
                // Lost a race with a concurrent start
                handle.abort();
                Err(SupervisorError::AlreadyRunning(name.to_string()))
            }
        }
    }

    /// Start every registered worker; failures do not stop the rest
    pub async fn start_all(&self) -> Vec<(String, SupervisorError)> {
        let names = self.names();
        let results = join_all(names.iter().map(|name| self.start(name))).await;

        names
            .into_iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    error!(worker = %name, error = %e, "Worker failed to start");
                    Some((name, e))
                }
            })
            .collect()
    }

    /// Signal a worker to stop and wait up to the grace period
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, SupervisorError> {
        let running = {
            let mut slots = self.slots.lock();
            let slot = slots
                .get_mut(name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
            slot.running
                .take()
                .ok_or_else(|| SupervisorError::NotRunning(name.to_string()))?
        };

        let Running {
            stop_tx,
            mut handle,
        } = running;
        // The loop may already have exited; nothing to signal then
        let _ = stop_tx.send(true);

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(())) => {
                info!(worker = %name, "Worker stopped");
                Ok(StopOutcome::Graceful)
            }
            Ok(Err(e)) => {
                error!(worker = %name, error = %e, "Worker task ended abnormally");
                Ok(StopOutcome::Forced)
            }
            Err(_) => {
                warn!(worker = %name, grace_ms = self.grace.as_millis() as u64, "Worker did not stop in time, aborting");
                handle.abort();
                Ok(StopOutcome::Forced)
            }
        }
    }

    /// Stop every running worker concurrently
    pub async fn stop_all(&self) -> Vec<(String, StopOutcome)> {
        let names: Vec<String> = {
            let slots = self.slots.lock();
            let mut names: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| slot.running.is_some())
                .map(|(name, _)| name.clone())
                .collect();
            names.sort();
            names
        };
        let results = join_all(names.iter().map(|name| self.stop(name))).await;

        names
            .into_iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(outcome) => Some((name, outcome)),
                Err(e) => {
                    warn!(worker = %name, error = %e, "Worker stop failed");
                    None
                }
            })
            .collect()
    }
}

async fn run_loop(worker: Arc<dyn Worker>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(worker.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = worker.tick().await {
                    warn!(worker = worker.name(), error = %e, "Worker tick failed");
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    worker.on_stop().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        name: &'static str,
        ticks: AtomicU32,
        stopped: AtomicU32,
        fail_start: bool,
        tick_delay: Option<Duration>,
    }

    impl Counter {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                ticks: AtomicU32::new(0),
                stopped: AtomicU32::new(0),
                fail_start: false,
                tick_delay: None,
            }
        }
    }

    #[async_trait]
    impl Worker for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn on_start(&self) -> anyhow::Result<()> {
            if self.fail_start {
                anyhow::bail!("cannot connect");
            }
            Ok(())
        }

        async fn tick(&self) -> anyhow::Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.tick_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn on_stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let supervisor = Supervisor::new(Duration::from_millis(100));
        supervisor.register(Arc::new(Counter::new("a"))).unwrap();
        let err = supervisor.register(Arc::new(Counter::new("a"))).unwrap_err();
        assert!(matches!(err, SupervisorError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_start_and_stop_gracefully() {
        let supervisor = Supervisor::new(Duration::from_millis(500));
        let worker = Arc::new(Counter::new("a"));
        supervisor.register(worker.clone()).unwrap();

        supervisor.start("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(supervisor.is_running("a"));

        assert_eq!(supervisor.stop("a").await.unwrap(), StopOutcome::Graceful);
        assert!(worker.ticks.load(Ordering::SeqCst) >= 1);
        assert_eq!(worker.stopped.load(Ordering::SeqCst), 1);
        assert!(!supervisor.is_running("a"));
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let supervisor = Supervisor::new(Duration::from_millis(100));
        supervisor.register(Arc::new(Counter::new("a"))).unwrap();
        supervisor.start("a").await.unwrap();
        assert!(matches!(
            supervisor.start("a").await,
            Err(SupervisorError::AlreadyRunning(_))
        ));
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_stopping_one_leaves_others_running() {
        let supervisor = Supervisor::new(Duration::from_millis(500));
        let a = Arc::new(Counter::new("a"));
        let b = Arc::new(Counter::new("b"));
        supervisor.register(a.clone()).unwrap();
        supervisor.register(b.clone()).unwrap();
        assert!(supervisor.start_all().await.is_empty());

        supervisor.stop("a").await.unwrap();
        let before = b.ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(supervisor.is_running("b"));
        assert!(b.ticks.load(Ordering::SeqCst) > before);
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_failed_start_is_isolated() {
        let supervisor = Supervisor::new(Duration::from_millis(100));
        let mut broken = Counter::new("broken");
        broken.fail_start = true;
        supervisor.register(Arc::new(broken)).unwrap();
        supervisor.register(Arc::new(Counter::new("ok"))).unwrap();

        let failures = supervisor.start_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
        assert!(supervisor.is_running("ok"));
        assert!(!supervisor.is_running("broken"));
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_slow_worker_is_forced() {
        let supervisor = Supervisor::new(Duration::from_millis(20));
        let mut slow = Counter::new("slow");
        slow.tick_delay = Some(Duration::from_secs(5));
        let slow = Arc::new(slow);
        supervisor.register(slow.clone()).unwrap();
        supervisor.start("slow").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(supervisor.stop("slow").await.unwrap(), StopOutcome::Forced);
        assert_eq!(slow.stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_and_idle() {
        let supervisor = Supervisor::new(Duration::from_millis(100));
        supervisor.register(Arc::new(Counter::new("idle"))).unwrap();
        assert!(matches!(
            supervisor.stop("missing").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.stop("idle").await,
            Err(SupervisorError::NotRunning(_))
        ));
    }
}
