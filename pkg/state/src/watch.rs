use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Put,
    Delete,
}

/// A single watch event representing a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub key: String,
    /// Store version the change was committed at.
    pub version: u64,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

/// In-memory event log of store mutations with monotonic sequence numbers.
/// Controllers subscribe to it to react to changes; the API replays it for
/// watch clients.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    events: VecDeque<WatchEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log keeping at most `max_events` for replay.
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events,
            })),
            sender,
        }
    }

    /// Record a new event. Called by the stores on every put/delete.
    pub async fn emit(
        &self,
        event_type: EventType,
        key: String,
        version: u64,
        value: Option<Vec<u8>>,
    ) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            key,
            version,
            value,
        };
        if inner.events.len() >= inner.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Buffered events after `from_seq` whose key starts with `prefix`.
    pub async fn events_since(&self, from_seq: u64, prefix: &str) -> Vec<WatchEvent> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| e.seq > from_seq && e.key.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ring_buffer_drops_oldest() {
        let log = EventLog::new(2);
        for i in 1..=3u64 {
            log.emit(EventType::Put, format!("/registry/namespaces/{}", i), i, None)
                .await;
        }
        let events = log.events_since(0, "").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 2);
        assert_eq!(log.current_seq().await, 3);
    }

    #[tokio::test]
    async fn test_events_since_filters_prefix() {
        let log = EventLog::new(16);
        log.emit(EventType::Put, "/registry/resourcepools/a".into(), 1, None).await;
        log.emit(EventType::Delete, "/registry/namespaces/b".into(), 2, None).await;
        let pools = log.events_since(0, "/registry/resourcepools/").await;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].version, 1);
    }
}
