//! "Apps updated" notifications
//! Consumers always re-fetch the full collection, so only the latest
//! revision matters: a receiver that falls behind skips straight to it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// Event name used when forwarding to the UI
pub const APPS_UPDATED_EVENT: &str = "apps-updated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppsEvent {
    /// The collection changed (insert, rename, delete, reorder, wipe)
    Updated { revision: u64 },
}

impl AppsEvent {
    pub fn revision(&self) -> u64 {
        match self {
            AppsEvent::Updated { revision } => *revision,
        }
    }
}

/// Publish/subscribe hub for collection changes
/// Revisions are stamped in publish order, so delivery order is revision order
pub struct EventBus {
    sender: broadcast::Sender<AppsEvent>,
    revision: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            revision: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppsEvent> {
        self.sender.subscribe()
    }

    /// Latest revision published so far (0 before any change)
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn publish_updated(&self) -> AppsEvent {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let event = AppsEvent::Updated { revision };
        // No live subscriber is fine; the next one re-fetches anyway
        if self.sender.send(event.clone()).is_err() {
            debug!("No subscribers for apps revision {}", revision);
        }
        event
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives the next event, skipping over anything missed while lagging
/// Returns `None` once the bus is gone
pub async fn next_event(receiver: &mut broadcast::Receiver<AppsEvent>) -> Option<AppsEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Apps event receiver lagged by {} revisions", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
