//! Debounced diagram persistence plus a cross-tab change broadcast.
//! Peripheral plumbing around the core: writers tag events with their own
//! origin so a tab can suppress the echo of its own save. Last write wins;
//! there is no merge.

use crate::core::error::AppError;
use crate::core::store::ServiceStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

/// Broadcast payload: which service changed and who saved it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramChanged {
    pub service_id: String,
    pub origin: String,
}

/// Process-wide publish/subscribe channel for diagram changes.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<DiagramChanged>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChangeHub { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagramChanged> {
        self.tx.subscribe()
    }

    /// Fire-and-forget: a send with no subscribers is fine.
    pub fn publish(&self, service_id: &str, origin: &str) {
        let _ = self.tx.send(DiagramChanged {
            service_id: service_id.to_string(),
            origin: origin.to_string(),
        });
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        ChangeHub::new(64)
    }
}

/// Timer-debounced writer for edited XML. A new save for the same service
/// supersedes the pending one; the write itself broadcasts on completion.
pub struct DebouncedSaver {
    store: Arc<dyn ServiceStore>,
    hub: ChangeHub,
    delay: Duration,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DebouncedSaver {
    pub fn new(store: Arc<dyn ServiceStore>, hub: ChangeHub, delay: Duration) -> Self {
        DebouncedSaver {
            store,
            hub,
            delay,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a write of `xml` for `service_id`, replacing any pending
    /// write for the same service.
    pub async fn schedule_save(&self, service_id: &str, xml: String, origin: &str) {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(service_id) {
            previous.abort();
        }

        let store = self.store.clone();
        let hub = self.hub.clone();
        let delay = self.delay;
        let service = service_id.to_string();
        let origin = origin.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.save_edited_xml(&service, &xml).await {
                Ok(()) => hub.publish(&service, &origin),
                Err(e) => warn!("debounced save for '{}' failed: {}", service, e),
            }
        });
        pending.insert(service_id.to_string(), handle);
    }

    /// Persist immediately, bypassing the timer. Used on shutdown.
    pub async fn save_now(
        &self,
        service_id: &str,
        xml: &str,
        origin: &str,
    ) -> Result<(), AppError> {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(service_id) {
            previous.abort();
        }
        drop(pending);

        self.store.save_edited_xml(service_id, xml).await?;
        self.hub.publish(service_id, origin);
        Ok(())
    }
}
