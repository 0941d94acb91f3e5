//! Subscriber registry
//!
//! Tracks subscribed clients and fans change notifications out to them.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use super::Subscriber;

/// Identifies one registration
///
/// The same client uuid may hold several handles; each is distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    id: u64,
    uuid: String,
}

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

/// Outcome of one `notify_all` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Subscribers that received the notification
    pub delivered: usize,

    /// Subscribers whose write failed during this pass
    pub failed: usize,

    /// Subscribers removed after the pass (failed or already inactive)
    pub removed: usize,
}

struct Entry {
    handle: SubscriberHandle,
    subscriber: Box<dyn Subscriber>,
}

/// Thread-safe set of active subscribers
///
/// ## Concurrency:
/// One mutex guards the whole collection: `subscribe`, `unsubscribe` and
/// `notify_all` exclude each other. A slow subscriber holds up the fan-out
/// only until its write deadline expires.
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return its handle
    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) -> SubscriberHandle {
        let handle = SubscriberHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            uuid: subscriber.client_uuid().to_string(),
        };

        let mut entries = self.entries.lock();
        entries.push(Entry {
            handle: handle.clone(),
            subscriber,
        });
        tracing::info!(
            "Client {} subscribed (handle {}). Total: {}",
            handle.uuid,
            handle.id,
            entries.len()
        );

        handle
    }

    /// Mark inactive, close and remove a registration
    ///
    /// Returns `false` if the handle was already gone.
    pub fn unsubscribe(&self, handle: &SubscriberHandle) -> bool {
        let mut entries = self.entries.lock();
        Self::remove_locked(&mut entries, handle)
    }

    /// Unsubscribe a registration belonging to `uuid`
    ///
    /// `preferred` wins when it belongs to `uuid` and is still registered;
    /// otherwise the oldest registration of that uuid is removed.
    pub fn unsubscribe_client(
        &self,
        uuid: &str,
        preferred: Option<&SubscriberHandle>,
    ) -> Option<SubscriberHandle> {
        let mut entries = self.entries.lock();

        let target = preferred
            .filter(|p| p.uuid == uuid && entries.iter().any(|e| &e.handle == *p))
            .cloned()
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| e.handle.uuid == uuid)
                    .map(|e| e.handle.clone())
            })?;

        Self::remove_locked(&mut entries, &target);
        Some(target)
    }

    /// Deliver `payload` to every active subscriber
    ///
    /// Delivery failures never reach the caller: the failing subscriber is
    /// marked inactive and, with every other inactive one, removed after the
    /// pass.
    pub fn notify_all(&self, payload: &Value) -> NotifyReport {
        let message = match serde_json::to_vec(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to serialize notification: {}", e);
                return NotifyReport::default();
            }
        };

        let mut entries = self.entries.lock();
        let mut report = NotifyReport::default();
        let mut stale = Vec::new();

        for entry in entries.iter_mut() {
            if !entry.subscriber.is_active() {
                stale.push(entry.handle.clone());
                continue;
            }

            match entry.subscriber.deliver(&message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to notify client {} (handle {}): {}",
                        entry.handle.uuid,
                        entry.handle.id,
                        e
                    );
                    report.failed += 1;
                    stale.push(entry.handle.clone());
                }
            }
        }

        for handle in &stale {
            if Self::remove_locked(&mut entries, handle) {
                report.removed += 1;
            }
        }

        tracing::debug!(
            "Notification delivered to {} subscribers ({} removed)",
            report.delivered,
            report.removed
        );
        report
    }

    /// Whether a handle is still registered
    pub fn contains(&self, handle: &SubscriberHandle) -> bool {
        self.entries.lock().iter().any(|e| &e.handle == handle)
    }

    /// Handles currently registered, in notification order
    pub fn handles(&self) -> Vec<SubscriberHandle> {
        self.entries.lock().iter().map(|e| e.handle.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn remove_locked(entries: &mut Vec<Entry>, handle: &SubscriberHandle) -> bool {
        let Some(position) = entries.iter().position(|e| &e.handle == handle) else {
            return false;
        };

        let mut entry = entries.remove(position);
        entry.subscriber.close();
        tracing::info!(
            "Client {} unsubscribed (handle {}). Total: {}",
            handle.uuid,
            handle.id,
            entries.len()
        );
        true
    }
}
