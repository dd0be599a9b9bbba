// Request handlers: sanitize -> store -> broadcast

use crate::error::RelayError;
use crate::event::{Event, Message};
use crate::hub::BroadcastHub;
use crate::sanitize;
use crate::store::MessageStore;
use std::collections::HashSet;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// The relay core: one store, one hub, one admin key set.
///
/// Mutating operations take the `mutations` guard across the
/// persist-then-broadcast pair, so broadcast order always matches store
/// order and no broadcast ever precedes its persistence.
pub struct Relay {
    store: MessageStore,
    hub: BroadcastHub,
    admin_keys: HashSet<String>,
    mutations: Mutex<()>,
}

impl Relay {
    pub fn new(store: MessageStore, admin_keys: HashSet<String>) -> Self {
        Self::with_queue_capacity(store, admin_keys, crate::hub::DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(
        store: MessageStore,
        admin_keys: HashSet<String>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            store,
            hub: BroadcastHub::new(queue_capacity),
            admin_keys,
            mutations: Mutex::new(()),
        }
    }

    /// Accept a submission: sanitize both fields, reject empties, persist,
    /// then fan out the stored record.
    pub async fn submit(&self, nick: &str, body: &str) -> Result<Message, RelayError> {
        let nickname = sanitize::clean(nick);
        let text = sanitize::clean(body);

        if nickname.is_empty() {
            return Err(RelayError::Validation("nickname is empty".to_string()));
        }
        if text.is_empty() {
            return Err(RelayError::Validation("message is empty".to_string()));
        }

        let _guard = self.mutations.lock().await;
        let message = self.store.append(&nickname, &text)?;

        tracing::info!("message {} from '{}' stored", message.id, message.nickname);

        // Fire-and-forget relative to the response; delivery failures are
        // absorbed inside the hub.
        self.hub.broadcast(Event::Message(message.clone())).await;

        Ok(message)
    }

    /// Retroactively delete a message, authorized by an admin key.
    pub async fn delete(&self, id: i64, admin_key: &str) -> Result<(), RelayError> {
        if !self.admin_keys.contains(admin_key) {
            tracing::warn!("delete of message {} rejected: bad admin key", id);
            return Err(RelayError::Unauthorized);
        }

        let _guard = self.mutations.lock().await;
        if !self.store.delete(id)? {
            return Err(RelayError::NotFound(id));
        }

        tracing::info!("message {} deleted", id);
        self.hub.broadcast(Event::Delete { id }).await;

        Ok(())
    }

    /// Full ordered history. No hub involvement, no side effects.
    pub fn history(&self) -> Result<Vec<Message>, RelayError> {
        Ok(self.store.scan_all()?)
    }

    /// Attach a live listener.
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<Event>) {
        self.hub.register().await
    }

    /// Detach a live listener; idempotent.
    pub async fn unsubscribe(&self, id: &Uuid) {
        self.hub.unregister(id).await
    }

    pub async fn listener_count(&self) -> usize {
        self.hub.listener_count().await
    }
}
