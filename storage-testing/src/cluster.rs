// SPDX-License-Identifier: GPL-3.0-only

//! In-memory API server

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, PersistentVolume, PersistentVolumeStatus};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use storage_contracts::{ClusterApi, StorageError, StorageErrorKind};
use storage_types::{LocalVolume, LocalVolumeSet};

type Key = (String, String);

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    storage_classes: BTreeMap<String, StorageClass>,
    pvs: BTreeMap<String, PersistentVolume>,
    local_volumes: BTreeMap<Key, LocalVolume>,
    local_volume_sets: BTreeMap<Key, LocalVolumeSet>,
}

/// Cluster state held in maps. Every mutating call is counted so tests can
/// assert that a steady-state reconcile writes nothing.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    writes: AtomicUsize,
}

/// Equality-only label selector evaluation (`k=v,k2=v2`).
pub fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

fn key_of<K: Resource>(object: &K) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}

fn not_found(what: &str, name: &str) -> StorageError {
    StorageError::not_found(format!("{what} {name} not found"))
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of create, update and delete calls served so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn insert_node(&self, node: Node) {
        self.state().nodes.insert(node.name_any(), node);
    }

    pub fn insert_storage_class(&self, class: StorageClass) {
        self.state().storage_classes.insert(class.name_any(), class);
    }

    pub fn insert_pv(&self, pv: PersistentVolume) {
        self.state().pvs.insert(pv.name_any(), pv);
    }

    pub fn insert_local_volume(&self, lv: LocalVolume) {
        self.state().local_volumes.insert(key_of(&lv), lv);
    }

    pub fn insert_local_volume_set(&self, lvset: LocalVolumeSet) {
        self.state().local_volume_sets.insert(key_of(&lvset), lvset);
    }

    pub fn pv(&self, name: &str) -> Option<PersistentVolume> {
        self.state().pvs.get(name).cloned()
    }

    pub fn pvs(&self) -> Vec<PersistentVolume> {
        self.state().pvs.values().cloned().collect()
    }

    pub fn storage_class(&self, name: &str) -> Option<StorageClass> {
        self.state().storage_classes.get(name).cloned()
    }

    pub fn local_volume(&self, namespace: &str, name: &str) -> Option<LocalVolume> {
        self.state()
            .local_volumes
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn local_volume_set(&self, namespace: &str, name: &str) -> Option<LocalVolumeSet> {
        self.state()
            .local_volume_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Set `status.phase` of a PV, as the volume controller would.
    pub fn set_pv_phase(&self, name: &str, phase: &str) {
        if let Some(pv) = self.state().pvs.get_mut(name) {
            pv.status = Some(PersistentVolumeStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            });
        }
    }

    /// Stamp a deletion timestamp on an owner, as a delete request would.
    pub fn mark_local_volume_deleting(&self, namespace: &str, name: &str) {
        let key = (namespace.to_string(), name.to_string());
        if let Some(lv) = self.state().local_volumes.get_mut(&key) {
            lv.metadata.deletion_timestamp = Some(Time(Default::default()));
        }
    }

    pub fn mark_local_volume_set_deleting(&self, namespace: &str, name: &str) {
        let key = (namespace.to_string(), name.to_string());
        if let Some(lvset) = self.state().local_volume_sets.get_mut(&key) {
            lvset.metadata.deletion_timestamp = Some(Time(Default::default()));
        }
    }
}

fn finalized<K: Resource>(object: &K) -> bool {
    object.meta().deletion_timestamp.is_some() && object.finalizers().is_empty()
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_node(&self, name: &str) -> Result<Node, StorageError> {
        self.state()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("node", name))
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>, StorageError> {
        Ok(self.state().storage_classes.get(name).cloned())
    }

    async fn list_storage_classes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<StorageClass>, StorageError> {
        Ok(self
            .state()
            .storage_classes
            .values()
            .filter(|class| selector_matches(label_selector, class.labels()))
            .cloned()
            .collect())
    }

    async fn delete_storage_class(&self, name: &str) -> Result<(), StorageError> {
        self.wrote();
        self.state()
            .storage_classes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("storage class", name))
    }

    async fn get_persistent_volume(
        &self,
        name: &str,
    ) -> Result<Option<PersistentVolume>, StorageError> {
        Ok(self.state().pvs.get(name).cloned())
    }

    async fn list_persistent_volumes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<PersistentVolume>, StorageError> {
        Ok(self
            .state()
            .pvs
            .values()
            .filter(|pv| selector_matches(label_selector, pv.labels()))
            .cloned()
            .collect())
    }

    async fn create_persistent_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<PersistentVolume, StorageError> {
        self.wrote();
        let name = pv.name_any();
        let mut state = self.state();
        if state.pvs.contains_key(&name) {
            return Err(StorageError::new(
                StorageErrorKind::AlreadyExists,
                format!("PV {name} already exists"),
            ));
        }
        let mut created = pv.clone();
        created.status = Some(PersistentVolumeStatus {
            phase: Some("Available".to_string()),
            ..Default::default()
        });
        state.pvs.insert(name, created.clone());
        Ok(created)
    }

    async fn update_persistent_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<PersistentVolume, StorageError> {
        self.wrote();
        let name = pv.name_any();
        let mut state = self.state();
        let stored = state
            .pvs
            .get_mut(&name)
            .ok_or_else(|| not_found("PV", &name))?;
        let status = stored.status.clone();
        *stored = pv.clone();
        stored.status = status;
        Ok(stored.clone())
    }

    async fn delete_persistent_volume(&self, name: &str) -> Result<(), StorageError> {
        self.wrote();
        self.state()
            .pvs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("PV", name))
    }

    async fn get_local_volume(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolume>, StorageError> {
        Ok(self.local_volume(namespace, name))
    }

    async fn update_local_volume(&self, lv: &LocalVolume) -> Result<LocalVolume, StorageError> {
        self.wrote();
        let key = key_of(lv);
        let mut state = self.state();
        if !state.local_volumes.contains_key(&key) {
            return Err(not_found("LocalVolume", &key.1));
        }
        if finalized(lv) {
            state.local_volumes.remove(&key);
        } else {
            state.local_volumes.insert(key, lv.clone());
        }
        Ok(lv.clone())
    }

    async fn update_local_volume_status(&self, lv: &LocalVolume) -> Result<LocalVolume, StorageError> {
        self.wrote();
        let key = key_of(lv);
        let mut state = self.state();
        let stored = state
            .local_volumes
            .get_mut(&key)
            .ok_or_else(|| not_found("LocalVolume", &key.1))?;
        stored.status = lv.status.clone();
        Ok(stored.clone())
    }

    async fn get_local_volume_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolumeSet>, StorageError> {
        Ok(self.local_volume_set(namespace, name))
    }

    async fn update_local_volume_set(
        &self,
        lvset: &LocalVolumeSet,
    ) -> Result<LocalVolumeSet, StorageError> {
        self.wrote();
        let key = key_of(lvset);
        let mut state = self.state();
        if !state.local_volume_sets.contains_key(&key) {
            return Err(not_found("LocalVolumeSet", &key.1));
        }
        if finalized(lvset) {
            state.local_volume_sets.remove(&key);
        } else {
            state.local_volume_sets.insert(key, lvset.clone());
        }
        Ok(lvset.clone())
    }

    async fn update_local_volume_set_status(
        &self,
        lvset: &LocalVolumeSet,
    ) -> Result<LocalVolumeSet, StorageError> {
        self.wrote();
        let key = key_of(lvset);
        let mut state = self.state();
        let stored = state
            .local_volume_sets
            .get_mut(&key)
            .ok_or_else(|| not_found("LocalVolumeSet", &key.1))?;
        stored.status = lvset.status.clone();
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_equality_selectors() {
        let labels = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert!(selector_matches("", &labels));
        assert!(selector_matches("a=1,b=2", &labels));
        assert!(!selector_matches("a=1,b=3", &labels));
        assert!(selector_matches("a", &labels));
        assert!(!selector_matches("c", &labels));
    }
}
