use crate::event::ChangeEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Receiving side handed to a transport. Messages are serialized events.
#[derive(Debug)]
pub struct Subscription {
    pub conn_id: String,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

/// Fan-out of change events to live viewers. Delivery never waits: a
/// subscriber whose queue is closed or full is dropped on the spot.
#[derive(Debug)]
pub struct BroadcastHub {
    queue_capacity: usize,
    conn_counter: AtomicU64,
    subscribers: Mutex<HashMap<String, mpsc::Sender<Arc<str>>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            conn_counter: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("conn-{id}")
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, mpsc::Sender<Arc<str>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscriber whose queue is pre-filled with `replay`, so the
    /// replay is always observed before any live event.
    pub fn subscribe(&self, replay: impl IntoIterator<Item = ChangeEvent>) -> Subscription {
        let replay: Vec<Arc<str>> = replay.into_iter().filter_map(|e| encode(&e)).collect();
        let (tx, rx) = mpsc::channel(self.queue_capacity + replay.len());
        for message in &replay {
            // Capacity covers the replay, so this cannot fail.
            let _ = tx.try_send(message.clone());
        }
        let conn_id = self.next_conn_id();
        self.lock().insert(conn_id.clone(), tx);
        info!(event = "subscriber_added", conn_id = %conn_id, replayed = replay.len());
        Subscription {
            conn_id,
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, conn_id: &str) -> bool {
        let removed = self.lock().remove(conn_id).is_some();
        if removed {
            info!(event = "subscriber_removed", conn_id = %conn_id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Serializes once and offers the message to every subscriber.
    /// Returns how many subscribers accepted it.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let Some(message) = encode(event) else {
            return 0;
        };
        let mut subscribers = self.lock();
        subscribers.retain(|conn_id, tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(event = "subscriber_dropped", conn_id = %conn_id, reason = "queue_full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = "subscriber_dropped", conn_id = %conn_id, reason = "closed");
                false
            }
        });
        debug!(event = "broadcast", kind = event.kind(), delivered = subscribers.len());
        subscribers.len()
    }
}

fn encode(event: &ChangeEvent) -> Option<Arc<str>> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Arc::from(text)),
        Err(err) => {
            warn!(event = "encode_error", kind = event.kind(), error = %err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(message: &str) -> ChangeEvent {
        serde_json::from_str(message).expect("valid event json")
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = BroadcastHub::default();
        let mut a = hub.subscribe(Vec::new());
        let mut b = hub.subscribe(Vec::new());
        assert_ne!(a.conn_id, b.conn_id);

        let event = ChangeEvent::PanelCreated {
            panel: "nav".to_string(),
        };
        assert_eq!(hub.publish(&event), 2);

        assert_eq!(decode(&a.receiver.recv().await.expect("a")), event);
        assert_eq!(decode(&b.receiver.recv().await.expect("b")), event);
    }

    #[tokio::test]
    async fn replay_is_queued_before_live_events() {
        let hub = BroadcastHub::new(1);
        let replay = vec![
            ChangeEvent::rendered("a", "<p>a</p>"),
            ChangeEvent::rendered("b", "<p>b</p>"),
            ChangeEvent::rendered("c", "<p>c</p>"),
        ];
        let mut sub = hub.subscribe(replay.clone());
        let live = ChangeEvent::PanelDeleted {
            panel: "c".to_string(),
        };
        assert_eq!(hub.publish(&live), 1);

        for expected in replay.iter().chain(std::iter::once(&live)) {
            assert_eq!(&decode(&sub.receiver.recv().await.expect("msg")), expected);
        }
    }

    #[test]
    fn closed_subscriber_is_removed_and_others_still_delivered() {
        let hub = BroadcastHub::default();
        let dead = hub.subscribe(Vec::new());
        let mut alive = hub.subscribe(Vec::new());
        drop(dead.receiver);

        assert_eq!(hub.publish(&ChangeEvent::rendered("default", "x")), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert!(alive.receiver.try_recv().is_ok());
    }

    #[test]
    fn saturated_subscriber_is_dropped_without_blocking() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe(Vec::new());

        assert_eq!(hub.publish(&ChangeEvent::rendered("default", "1")), 1);
        assert_eq!(hub.publish(&ChangeEvent::rendered("default", "2")), 0);
        assert_eq!(hub.subscriber_count(), 0);

        // What was queued before the drop is still readable.
        assert!(slow.receiver.try_recv().is_ok());
        assert!(slow.receiver.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = BroadcastHub::default();
        let sub = hub.subscribe(Vec::new());
        assert!(hub.unsubscribe(&sub.conn_id));
        assert!(!hub.unsubscribe(&sub.conn_id));
        assert_eq!(hub.publish(&ChangeEvent::rendered("default", "x")), 0);
    }
}
