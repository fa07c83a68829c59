//! Read access to destination configuration, plus the two removal requests
//! the core may issue against it.
//!
//! Destination storage is owned by the chat-configuration subsystem; the
//! core never writes it directly. `deregister` is invoked on a permanent
//! destination failure, `detach_channel` when only the mirrored channel has
//! become unwritable. Whether the subsystem notifies anyone about either is
//! its own concern.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::types::{Destination, DestinationId};

#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Current configuration for a destination, if it is registered.
    async fn destination(&self, id: &DestinationId) -> Option<Destination>;

    /// Remove the destination entirely. Called after a permanent failure on
    /// its direct chat.
    async fn deregister(&self, id: &DestinationId, reason: &str);

    /// Unlink the destination's mirrored channel, keeping the chat. Called
    /// after a permanent failure on the channel only.
    async fn detach_channel(&self, id: &DestinationId, reason: &str);
}

/// In-memory directory for tests and embedded setups.
#[derive(Default)]
pub struct InMemoryDirectory {
    destinations: Mutex<HashMap<DestinationId, Destination>>,
    removals: Mutex<Vec<(DestinationId, String)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, destination: Destination) {
        let mut guard = self.destinations.lock().await;
        guard.insert(destination.id.clone(), destination);
    }

    /// Destinations deregistered so far, with the reported reasons.
    pub async fn removed(&self) -> Vec<(DestinationId, String)> {
        self.removals.lock().await.clone()
    }
}

#[async_trait]
impl ChatDirectory for InMemoryDirectory {
    async fn destination(&self, id: &DestinationId) -> Option<Destination> {
        let guard = self.destinations.lock().await;
        guard.get(id).cloned()
    }

    async fn deregister(&self, id: &DestinationId, reason: &str) {
        let mut guard = self.destinations.lock().await;
        guard.remove(id);
        drop(guard);
        self.removals
            .lock()
            .await
            .push((id.clone(), reason.to_string()));
    }

    async fn detach_channel(&self, id: &DestinationId, _reason: &str) {
        let mut guard = self.destinations.lock().await;
        if let Some(destination) = guard.get_mut(id) {
            destination.channel = None;
        }
    }
}
