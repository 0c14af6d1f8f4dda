//! Domain events module
//!
//! Fire-and-forget publication of exits, alerts and command outcomes

mod types;

pub use types::{DomainEvent, Severity};

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Trait for event consumers; publishing never fails the caller
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// In-process fan-out over a broadcast channel
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            tracing::debug!(kind, "No event subscribers");
        }
    }
}

/// Sink that keeps every event; used by tests and the CLI
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn alert() -> DomainEvent {
        DomainEvent::RiskAlert {
            severity: Severity::Warning,
            message: "test".to_string(),
            tracker_id: None,
            command_id: Some(Uuid::new_v4()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bus_fans_out() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let event = alert();
        bus.publish(event.clone());

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(alert());
    }

    #[test]
    fn test_memory_sink_counts_by_kind() {
        let sink = MemorySink::new();
        sink.publish(alert());
        sink.publish(alert());
        assert_eq!(sink.count("risk_alert"), 2);
        assert_eq!(sink.count("exit_triggered"), 0);
        assert_eq!(sink.events().len(), 2);
    }
}
