// SPDX-License-Identifier: GPL-3.0-only

//! In-memory cache of the PVs published by this node

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use storage_types::OwnerIdentity;

/// PV phase set once the claim is gone and before cleanup.
pub const PHASE_RELEASED: &str = "Released";
pub const PHASE_BOUND: &str = "Bound";
pub const PHASE_AVAILABLE: &str = "Available";

pub fn pv_phase(pv: &PersistentVolume) -> &str {
    pv.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or_default()
}

#[derive(Default)]
struct CacheInner {
    by_name: BTreeMap<String, PersistentVolume>,
    by_owner: BTreeMap<OwnerIdentity, BTreeSet<String>>,
    populated: bool,
}

impl CacheInner {
    fn unindex(&mut self, name: &str) {
        let Some(previous) = self.by_name.get(name) else {
            return;
        };
        if let Some(owner) = OwnerIdentity::from_labels(previous.labels()) {
            if let Some(names) = self.by_owner.get_mut(&owner) {
                names.remove(name);
                if names.is_empty() {
                    self.by_owner.remove(&owner);
                }
            }
        }
    }
}

/// Written by the PV watch, read by the reconcilers. Readers may see a
/// slightly stale view but never a half-applied update.
#[derive(Default)]
pub struct PvCache {
    inner: RwLock<CacheInner>,
}

impl PvCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_update(&self, pv: PersistentVolume) {
        let name = pv.name_any();
        let owner = OwnerIdentity::from_labels(pv.labels());
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.unindex(&name);
        if let Some(owner) = owner {
            inner.by_owner.entry(owner).or_default().insert(name.clone());
        }
        inner.by_name.insert(name, pv);
    }

    pub fn delete(&self, name: &str) -> Option<PersistentVolume> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.unindex(name);
        inner.by_name.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<PersistentVolume> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_name.get(name).cloned()
    }

    pub fn list(&self) -> Vec<PersistentVolume> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_name.values().cloned().collect()
    }

    pub fn list_by_owner(&self, owner: &OwnerIdentity) -> Vec<PersistentVolume> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|name| inner.by_name.get(name).cloned())
            .collect()
    }

    /// Cached PVs of `owner` currently in the Released phase.
    pub fn released_for_owner(&self, owner: &OwnerIdentity) -> Vec<PersistentVolume> {
        self.list_by_owner(owner)
            .into_iter()
            .filter(|pv| pv_phase(pv) == PHASE_RELEASED)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_populated(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .populated
    }

    /// Replace the whole content with `pvs` and mark the cache as loaded.
    pub fn populate(&self, pvs: Vec<PersistentVolume>) {
        let mut fresh = CacheInner {
            populated: true,
            ..Default::default()
        };
        for pv in pvs {
            let name = pv.name_any();
            if let Some(owner) = OwnerIdentity::from_labels(pv.labels()) {
                fresh.by_owner.entry(owner).or_default().insert(name.clone());
            }
            fresh.by_name.insert(name, pv);
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PersistentVolumeStatus;
    use kube::api::ObjectMeta;

    fn pv(name: &str, owner: &OwnerIdentity, phase: &str) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(owner.labels()),
                ..Default::default()
            },
            status: Some(PersistentVolumeStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn indexes_by_name_and_owner() {
        let cache = PvCache::new();
        let lv = OwnerIdentity::new("LocalVolume", "ns", "a");
        let set = OwnerIdentity::new("LocalVolumeSet", "ns", "b");

        cache.add_or_update(pv("local-pv-1", &lv, PHASE_AVAILABLE));
        cache.add_or_update(pv("local-pv-2", &lv, PHASE_RELEASED));
        cache.add_or_update(pv("local-pv-3", &set, PHASE_BOUND));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.list_by_owner(&lv).len(), 2);
        assert_eq!(cache.released_for_owner(&lv).len(), 1);

        // relabeling moves the PV between owners
        cache.add_or_update(pv("local-pv-2", &set, PHASE_RELEASED));
        assert_eq!(cache.list_by_owner(&lv).len(), 1);
        assert_eq!(cache.list_by_owner(&set).len(), 2);

        assert!(cache.delete("local-pv-3").is_some());
        assert!(cache.delete("local-pv-3").is_none());
        assert_eq!(cache.list_by_owner(&set).len(), 1);
    }

    #[test]
    fn populate_replaces_content() {
        let cache = PvCache::new();
        let owner = OwnerIdentity::new("LocalVolume", "ns", "a");
        cache.add_or_update(pv("stale", &owner, PHASE_AVAILABLE));
        assert!(!cache.is_populated());

        cache.populate(vec![pv("local-pv-9", &owner, PHASE_AVAILABLE)]);
        assert!(cache.is_populated());
        assert!(cache.get("stale").is_none());
        assert_eq!(cache.list_by_owner(&owner).len(), 1);
    }
}
