// SPDX-License-Identifier: GPL-3.0-only

//! Released volume cleanup
//!
//! The reconcilers drain released PVs through a `Deleter` before touching
//! any device, and consult the `CleanupTracker` so a PV is never recreated
//! while its cleanup is still running.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use storage_contracts::{ClusterApi, DeviceWiper};
use storage_types::VolumeMode;
use storage_types::labels::PROVISIONED_BY_ANNOTATION;
use tracing::{debug, info, warn};

use crate::cache::{PHASE_RELEASED, PvCache, pv_phase};
use crate::error::DiskmakerError;
use crate::pv::{RECLAIM_DELETE, with_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    InProgress,
    Succeeded,
    Failed,
}

/// Cleanup status per PV name.
#[derive(Default)]
pub struct CleanupTracker {
    states: Mutex<HashMap<String, CleanupState>>,
}

impl CleanupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, pv_name: &str) -> Option<CleanupState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pv_name)
            .copied()
    }

    pub fn in_progress(&self, pv_name: &str) -> bool {
        self.state(pv_name) == Some(CleanupState::InProgress)
    }

    /// Returns false when a cleanup for `pv_name` is already running.
    pub fn start(&self, pv_name: &str) -> bool {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.get(pv_name) == Some(&CleanupState::InProgress) {
            return false;
        }
        states.insert(pv_name.to_string(), CleanupState::InProgress);
        true
    }

    pub fn finish(&self, pv_name: &str, succeeded: bool) {
        let state = if succeeded {
            CleanupState::Succeeded
        } else {
            CleanupState::Failed
        };
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pv_name.to_string(), state);
    }

    /// Drop a finished entry.
    pub fn forget(&self, pv_name: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.get(pv_name) != Some(&CleanupState::InProgress) {
            states.remove(pv_name);
        }
    }
}

#[async_trait]
pub trait Deleter: Send + Sync {
    /// Clean up every released PV published under `provisioner_name`.
    async fn delete_pvs(&self, provisioner_name: &str);
}

/// Wipes and then deletes released block PVs whose reclaim policy is Delete.
/// The next reconcile republishes the symlink as a fresh PV. Filesystem PVs
/// are left to an external cleaner.
pub struct ReleasedVolumeDeleter {
    symlink_root: PathBuf,
    api: Arc<dyn ClusterApi>,
    wiper: Arc<dyn DeviceWiper>,
    cache: Arc<PvCache>,
    cleanup: Arc<CleanupTracker>,
}

impl ReleasedVolumeDeleter {
    pub fn new(
        symlink_root: PathBuf,
        api: Arc<dyn ClusterApi>,
        wiper: Arc<dyn DeviceWiper>,
        cache: Arc<PvCache>,
        cleanup: Arc<CleanupTracker>,
    ) -> Self {
        Self {
            symlink_root,
            api,
            wiper,
            cache,
            cleanup,
        }
    }

    /// Local path of a released block PV mapped into this container.
    fn device_link(&self, pv: &PersistentVolume) -> Option<PathBuf> {
        let spec = pv.spec.as_ref()?;
        if spec.volume_mode.as_deref() != Some(VolumeMode::Block.as_str()) {
            return None;
        }
        let class = spec.storage_class_name.as_deref()?;
        let base = Path::new(&spec.local.as_ref()?.path).file_name()?;
        Some(self.symlink_root.join(class).join(base))
    }
}

#[async_trait]
impl Deleter for ReleasedVolumeDeleter {
    async fn delete_pvs(&self, provisioner_name: &str) {
        for pv in self.cache.list() {
            let provisioned_by = pv
                .annotations()
                .get(PROVISIONED_BY_ANNOTATION)
                .map(String::as_str);
            if provisioned_by != Some(provisioner_name) || pv_phase(&pv) != PHASE_RELEASED {
                continue;
            }

            let name = pv.name_any();
            let Some(device) = self.device_link(&pv) else {
                debug!(pv = %name, "released PV is not a local block volume");
                continue;
            };
            let reclaim = pv
                .spec
                .as_ref()
                .and_then(|spec| spec.persistent_volume_reclaim_policy.as_deref());
            if reclaim != Some(RECLAIM_DELETE) {
                debug!(pv = %name, ?reclaim, "released PV is not reclaimable");
                continue;
            }
            if !self.cleanup.start(&name) {
                continue;
            }

            if let Err(e) = self.wiper.wipe(&device).await {
                warn!(pv = %name, device = %device.display(), "failed to wipe released volume: {e}");
                self.cleanup.finish(&name, false);
                continue;
            }

            match with_timeout("delete PV", self.api.delete_persistent_volume(&name)).await {
                Ok(()) => {
                    info!(pv = %name, device = %device.display(), "wiped and deleted released PV");
                    self.cache.delete(&name);
                    self.cleanup.finish(&name, true);
                }
                Err(DiskmakerError::Cluster(err)) if err.is_not_found() => {
                    self.cache.delete(&name);
                    self.cleanup.finish(&name, true);
                }
                Err(e) => {
                    warn!(pv = %name, "failed to delete released PV: {e}");
                    self.cleanup.finish(&name, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_cleanup_lifecycle() {
        let tracker = CleanupTracker::new();
        assert!(!tracker.in_progress("local-pv-1"));

        assert!(tracker.start("local-pv-1"));
        assert!(!tracker.start("local-pv-1"));
        assert!(tracker.in_progress("local-pv-1"));

        // a running cleanup is never forgotten
        tracker.forget("local-pv-1");
        assert!(tracker.in_progress("local-pv-1"));

        tracker.finish("local-pv-1", false);
        assert_eq!(tracker.state("local-pv-1"), Some(CleanupState::Failed));
        tracker.forget("local-pv-1");
        assert_eq!(tracker.state("local-pv-1"), None);
    }
}
