// SPDX-License-Identifier: GPL-3.0-only

//! `ClusterApi` over a kube client

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use storage_contracts::{ClusterApi, StorageError, StorageErrorKind};
use storage_types::{LocalVolume, LocalVolumeSet};

#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope>,
        K::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_kube_error(operation: &str, err: kube::Error) -> StorageError {
    match err {
        kube::Error::Api(response) => StorageError::new(
            StorageErrorKind::from_code(response.code),
            format!("{operation}: {}", response.message),
        ),
        other => StorageError::new(StorageErrorKind::Unavailable, format!("{operation}: {other}")),
    }
}

fn list_params(label_selector: &str) -> ListParams {
    if label_selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(label_selector)
    }
}

async fn replace<K>(api: &Api<K>, object: &K, operation: &str) -> Result<K, StorageError>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    api.replace(&object.name_any(), &PostParams::default(), object)
        .await
        .map_err(|e| map_kube_error(operation, e))
}

async fn replace_status<K>(api: &Api<K>, object: &K, operation: &str) -> Result<K, StorageError>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let body = serde_json::to_vec(object)
        .map_err(|e| StorageError::new(StorageErrorKind::Internal, format!("{operation}: {e}")))?;
    api.replace_status(&object.name_any(), &PostParams::default(), body)
        .await
        .map_err(|e| map_kube_error(operation, e))
}

fn namespace_of<K: kube::Resource>(object: &K) -> Result<String, StorageError> {
    object.namespace().ok_or_else(|| {
        StorageError::new(
            StorageErrorKind::InvalidInput,
            format!("{} has no namespace", object.name_any()),
        )
    })
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_node(&self, name: &str) -> Result<Node, StorageError> {
        self.cluster::<Node>()
            .get(name)
            .await
            .map_err(|e| map_kube_error("get node", e))
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>, StorageError> {
        self.cluster::<StorageClass>()
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error("get storage class", e))
    }

    async fn list_storage_classes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<StorageClass>, StorageError> {
        self.cluster::<StorageClass>()
            .list(&list_params(label_selector))
            .await
            .map(|list| list.items)
            .map_err(|e| map_kube_error("list storage classes", e))
    }

    async fn delete_storage_class(&self, name: &str) -> Result<(), StorageError> {
        self.cluster::<StorageClass>()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error("delete storage class", e))
    }

    async fn get_persistent_volume(
        &self,
        name: &str,
    ) -> Result<Option<PersistentVolume>, StorageError> {
        self.cluster::<PersistentVolume>()
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error("get PV", e))
    }

    async fn list_persistent_volumes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<PersistentVolume>, StorageError> {
        self.cluster::<PersistentVolume>()
            .list(&list_params(label_selector))
            .await
            .map(|list| list.items)
            .map_err(|e| map_kube_error("list PVs", e))
    }

    async fn create_persistent_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<PersistentVolume, StorageError> {
        self.cluster::<PersistentVolume>()
            .create(&PostParams::default(), pv)
            .await
            .map_err(|e| map_kube_error("create PV", e))
    }

    async fn update_persistent_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<PersistentVolume, StorageError> {
        replace(&self.cluster::<PersistentVolume>(), pv, "update PV").await
    }

    async fn delete_persistent_volume(&self, name: &str) -> Result<(), StorageError> {
        self.cluster::<PersistentVolume>()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error("delete PV", e))
    }

    async fn get_local_volume(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolume>, StorageError> {
        self.namespaced::<LocalVolume>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error("get LocalVolume", e))
    }

    async fn update_local_volume(&self, lv: &LocalVolume) -> Result<LocalVolume, StorageError> {
        let api = self.namespaced::<LocalVolume>(&namespace_of(lv)?);
        replace(&api, lv, "update LocalVolume").await
    }

    async fn update_local_volume_status(&self, lv: &LocalVolume) -> Result<LocalVolume, StorageError> {
        let api = self.namespaced::<LocalVolume>(&namespace_of(lv)?);
        replace_status(&api, lv, "update LocalVolume status").await
    }

    async fn get_local_volume_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolumeSet>, StorageError> {
        self.namespaced::<LocalVolumeSet>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error("get LocalVolumeSet", e))
    }

    async fn update_local_volume_set(
        &self,
        lvset: &LocalVolumeSet,
    ) -> Result<LocalVolumeSet, StorageError> {
        let api = self.namespaced::<LocalVolumeSet>(&namespace_of(lvset)?);
        replace(&api, lvset, "update LocalVolumeSet").await
    }

    async fn update_local_volume_set_status(
        &self,
        lvset: &LocalVolumeSet,
    ) -> Result<LocalVolumeSet, StorageError> {
        let api = self.namespaced::<LocalVolumeSet>(&namespace_of(lvset)?);
        replace_status(&api, lvset, "update LocalVolumeSet status").await
    }
}
