// SPDX-License-Identifier: GPL-3.0-only

//! Event deduplication in front of the event sink
//!
//! Device events are published once per (reason, type, device) for the life
//! of the process. Owner-wide events go through a per-key rate limiter.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::ObjectReference;
use storage_contracts::EventSink;
use storage_types::{DiskEvent, EventType};
use tracing::{debug, warn};

use crate::age::{Clock, SystemClock};

/// Default interval between two owner-wide events with the same key.
pub const DEFAULT_EVENT_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub struct EventDeduplicator {
    sink: Arc<dyn EventSink>,
    seen: Mutex<HashSet<(String, EventType, String)>>,
}

impl EventDeduplicator {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Publish `event` unless its key was already published. Returns whether
    /// the event went out.
    pub async fn report(&self, regarding: &ObjectReference, event: &DiskEvent) -> bool {
        let fresh = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.key());
        if !fresh {
            debug!(reason = %event.reason, device = %event.device, "dropping duplicate event");
            return false;
        }

        if let Err(e) = self.sink.publish(regarding, event).await {
            warn!(reason = %event.reason, "failed to publish event: {e}");
            // allow a later retry of the same key
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&event.key());
            return false;
        }
        true
    }
}

/// Rate limits events by caller-chosen key.
pub struct KeyedEventLimiter {
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl KeyedEventLimiter {
    pub fn new(sink: Arc<dyn EventSink>, interval: Duration) -> Self {
        Self::with_clock(sink, interval, Arc::new(SystemClock))
    }

    pub fn with_clock(sink: Arc<dyn EventSink>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            clock,
            interval,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Publish `event` if nothing was sent under `key` within the interval.
    pub async fn report(&self, key: &str, regarding: &ObjectReference, event: &DiskEvent) -> bool {
        let now = self.clock.now();
        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sent) = last_sent.get(key) {
                if now.saturating_duration_since(*sent) < self.interval {
                    return false;
                }
            }
            last_sent.insert(key.to_string(), now);
        }

        if let Err(e) = self.sink.publish(regarding, event).await {
            warn!(key, reason = %event.reason, "failed to publish event: {e}");
            self.last_sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::age::ManualClock;
    use async_trait::async_trait;
    use storage_contracts::StorageError;

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<DiskEvent>>,
    }

    #[async_trait]
    impl EventSink for Recorder {
        async fn publish(
            &self,
            _regarding: &ObjectReference,
            event: &DiskEvent,
        ) -> Result<(), StorageError> {
            self.published.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn drops_repeated_device_events() {
        let sink = Arc::new(Recorder::default());
        let dedup = EventDeduplicator::new(sink.clone());
        let regarding = ObjectReference::default();
        let event = DiskEvent::warning("SymLinkedOnDeviceName", "no by-id path").with_device("sdb");

        assert!(dedup.report(&regarding, &event).await);
        assert!(!dedup.report(&regarding, &event).await);
        assert!(dedup.report(&regarding, &event.clone().with_device("sdc")).await);
        assert_eq!(sink.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn replays_keyed_events_after_interval() {
        let sink = Arc::new(Recorder::default());
        let clock = Arc::new(ManualClock::new());
        let limiter = KeyedEventLimiter::with_clock(sink.clone(), DEFAULT_EVENT_INTERVAL, clock.clone());
        let regarding = ObjectReference::default();
        let event = DiskEvent::warning("DeletionBlocked", "bound PVs remain");

        assert!(limiter.report("ns/lv", &regarding, &event).await);
        clock.advance(Duration::from_secs(60));
        assert!(!limiter.report("ns/lv", &regarding, &event).await);
        assert!(limiter.report("ns/other", &regarding, &event).await);
        clock.advance(DEFAULT_EVENT_INTERVAL);
        assert!(limiter.report("ns/lv", &regarding, &event).await);
        assert_eq!(sink.published.lock().unwrap().len(), 3);
    }
}
