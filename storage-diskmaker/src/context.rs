// SPDX-License-Identifier: GPL-3.0-only

//! Process-scoped components shared by every reconcile

use std::sync::Arc;

use storage_contracts::{ClusterApi, DeviceLister, DeviceWiper, EventSink, VolumeUtil};

use crate::age::{Clock, DeviceAgeMap, SystemClock};
use crate::cache::PvCache;
use crate::config::Settings;
use crate::deleter::{CleanupTracker, Deleter, ReleasedVolumeDeleter};
use crate::events::{DEFAULT_EVENT_INTERVAL, EventDeduplicator, KeyedEventLimiter};
use crate::metrics::ProvisionMetrics;
use crate::owner_index::StorageClassOwnerIndex;

/// Outside collaborators the daemon talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn ClusterApi>,
    pub events: Arc<dyn EventSink>,
    pub lister: Arc<dyn DeviceLister>,
    pub wiper: Arc<dyn DeviceWiper>,
    pub volume_util: Arc<dyn VolumeUtil>,
}

/// Everything a reconcile needs, constructed once in `main` (or a test).
pub struct DaemonContext {
    pub settings: Settings,
    pub api: Arc<dyn ClusterApi>,
    pub lister: Arc<dyn DeviceLister>,
    pub wiper: Arc<dyn DeviceWiper>,
    pub volume_util: Arc<dyn VolumeUtil>,
    pub cache: Arc<PvCache>,
    pub cleanup: Arc<CleanupTracker>,
    pub deleter: Arc<dyn Deleter>,
    pub owner_index: Arc<StorageClassOwnerIndex>,
    pub ages: Arc<DeviceAgeMap>,
    pub device_events: EventDeduplicator,
    pub owner_events: KeyedEventLimiter,
    pub metrics: Arc<ProvisionMetrics>,
}

impl DaemonContext {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self::with_clock(settings, collaborators, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, collaborators: Collaborators, clock: Arc<dyn Clock>) -> Self {
        let Collaborators {
            api,
            events,
            lister,
            wiper,
            volume_util,
        } = collaborators;
        let cache = Arc::new(PvCache::new());
        let cleanup = Arc::new(CleanupTracker::new());
        let deleter = Arc::new(ReleasedVolumeDeleter::new(
            settings.symlink_root.clone(),
            api.clone(),
            wiper.clone(),
            cache.clone(),
            cleanup.clone(),
        ));

        Self {
            settings,
            lister,
            wiper,
            volume_util,
            cache,
            cleanup,
            deleter,
            owner_index: Arc::new(StorageClassOwnerIndex::new()),
            ages: Arc::new(DeviceAgeMap::new(clock.clone())),
            device_events: EventDeduplicator::new(events.clone()),
            owner_events: KeyedEventLimiter::with_clock(events, DEFAULT_EVENT_INTERVAL, clock),
            metrics: Arc::new(ProvisionMetrics::new()),
            api,
        }
    }

    /// Replace the built-in released volume deleter.
    pub fn with_deleter(mut self, deleter: Arc<dyn Deleter>) -> Self {
        self.deleter = deleter;
        self
    }
}
