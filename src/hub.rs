// Live-listener registry and event fan-out

use crate::event::Event;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound queue bound per listener. A listener that falls this far
/// behind is dropped rather than allowed to stall a broadcast.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// The set of currently-connected live listeners.
///
/// Each listener owns a bounded outbound queue; `broadcast` pushes with
/// `try_send` and never blocks. A listener whose queue is full or whose
/// receiving side is gone is swept out of the set, equivalent to
/// `unregister`. Delivery failures never surface to the caller.
pub struct BroadcastHub {
    listeners: RwLock<HashMap<Uuid, mpsc::Sender<Event>>>,
    queue_capacity: usize,
}

impl BroadcastHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Add a listener, returning its id and the receiving end of its
    /// event queue. Broadcasts include this listener until it is removed.
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();

        let mut listeners = self.listeners.write().await;
        listeners.insert(id, tx);
        tracing::debug!("listener {} registered ({} total)", id, listeners.len());

        (id, rx)
    }

    /// Remove a listener. Removing an already-absent id is a no-op.
    pub async fn unregister(&self, id: &Uuid) {
        let mut listeners = self.listeners.write().await;
        if listeners.remove(id).is_some() {
            tracing::debug!("listener {} unregistered ({} total)", id, listeners.len());
        }
    }

    /// Deliver an event to every current listener, best-effort.
    pub async fn broadcast(&self, event: Event) {
        let listeners = self.listeners.read().await;

        let mut failed = Vec::new();
        for (id, tx) in listeners.iter() {
            if tx.try_send(event.clone()).is_err() {
                tracing::warn!("listener {} unreachable, dropping", id);
                failed.push(*id);
            }
        }
        drop(listeners);

        if !failed.is_empty() {
            let mut listeners = self.listeners.write().await;
            for id in failed {
                listeners.remove(&id);
            }
        }
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
