// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::api::storage::v1::StorageClass;

use storage_types::{LocalVolume, LocalVolumeSet};

use crate::StorageError;

/// API-server operations the node daemon performs.
///
/// `get_*` calls return `Ok(None)` for missing objects; every other missing
/// object surfaces as a `NotFound` error.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<Node, StorageError>;

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>, StorageError>;

    async fn list_storage_classes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<StorageClass>, StorageError>;

    async fn delete_storage_class(&self, name: &str) -> Result<(), StorageError>;

    async fn get_persistent_volume(
        &self,
        name: &str,
    ) -> Result<Option<PersistentVolume>, StorageError>;

    async fn list_persistent_volumes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<PersistentVolume>, StorageError>;

    async fn create_persistent_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<PersistentVolume, StorageError>;

    /// Replace a PV; fails with `Conflict` on a stale resource version.
    async fn update_persistent_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<PersistentVolume, StorageError>;

    async fn delete_persistent_volume(&self, name: &str) -> Result<(), StorageError>;

    async fn get_local_volume(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolume>, StorageError>;

    /// Replace metadata and spec (finalizers included).
    async fn update_local_volume(&self, lv: &LocalVolume) -> Result<LocalVolume, StorageError>;

    async fn update_local_volume_status(&self, lv: &LocalVolume) -> Result<LocalVolume, StorageError>;

    async fn get_local_volume_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolumeSet>, StorageError>;

    async fn update_local_volume_set(
        &self,
        lvset: &LocalVolumeSet,
    ) -> Result<LocalVolumeSet, StorageError>;

    async fn update_local_volume_set_status(
        &self,
        lvset: &LocalVolumeSet,
    ) -> Result<LocalVolumeSet, StorageError>;
}
