//! Broadcast sink
//!
//! Listeners are registered as unbounded channel senders. A send that fails
//! means the receiving connection is gone, so the listener is pruned as part
//! of the same broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::Event;

/// Handle identifying a registered listener
pub type ListenerId = u64;

/// A registered listener: its handle plus the stream of serialized events
pub struct Listener {
    pub id: ListenerId,
    pub receiver: mpsc::UnboundedReceiver<String>,
}

/// Fan-out of events to every connected listener
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

#[derive(Default)]
struct BroadcasterInner {
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener
    pub fn register(&self) -> Listener {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners.lock().insert(id, tx);

        tracing::debug!(listener_id = id, "Listener registered");
        Listener { id, receiver: rx }
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.inner.listeners.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(listener_id = id, "Listener unregistered");
        }
        removed
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Send an event to every listener.
    ///
    /// Returns the number of listeners the event was delivered to.
    pub fn broadcast(&self, event: &Event) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event = event.kind(), "Failed to serialize event: {}", e);
                return 0;
            }
        };

        let mut listeners = self.inner.listeners.lock();
        let mut dead = Vec::new();
        for (id, tx) in listeners.iter() {
            if tx.send(payload.clone()).is_err() {
                dead.push(*id);
            }
        }

        for id in &dead {
            listeners.remove(id);
        }
        if !dead.is_empty() {
            tracing::debug!(pruned = dead.len(), "Pruned closed listeners");
        }

        listeners.len()
    }
}
