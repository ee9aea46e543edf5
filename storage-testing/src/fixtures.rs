// SPDX-License-Identifier: GPL-3.0-only

//! Builders for the objects the reconcilers read

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::ObjectMeta;
use storage_types::labels::HOSTNAME_LABEL;
use storage_types::{
    BlockDevice, DeviceInclusionSpec, DeviceType, LocalVolume, LocalVolumeSet, LocalVolumeSetSpec,
    LocalVolumeSpec, StorageClassDevice, VolumeMode,
};

pub const NODE_NAME: &str = "worker-0";
pub const NODE_UID: &str = "2f1c9a4e-0000-4000-8000-000000000001";
pub const HOSTNAME: &str = "worker-0.example.com";
pub const NAMESPACE: &str = "openshift-local-storage";

pub fn node() -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(NODE_NAME.to_string()),
            uid: Some(NODE_UID.to_string()),
            labels: Some(BTreeMap::from([(
                HOSTNAME_LABEL.to_string(),
                HOSTNAME.to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn storage_class(name: &str, reclaim_policy: Option<&str>) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        provisioner: "kubernetes.io/no-provisioner".to_string(),
        reclaim_policy: reclaim_policy.map(str::to_string),
        volume_binding_mode: Some("WaitForFirstConsumer".to_string()),
        ..Default::default()
    }
}

/// An idle non-rotational disk as `lsblk` reports it.
pub fn disk(kernel_name: &str, size_bytes: u64) -> BlockDevice {
    BlockDevice {
        kernel_name: kernel_name.to_string(),
        name: kernel_name.to_string(),
        device_type: DeviceType::Disk,
        size_bytes,
        model: "SAMSUNG MZ7LH480".to_string(),
        vendor: "ATA".to_string(),
        rotational: "0".to_string(),
        read_only: "0".to_string(),
        removable: "0".to_string(),
        state: "running".to_string(),
        ..Default::default()
    }
}

pub fn class_devices(storage_class: &str, volume_mode: VolumeMode, paths: &[&str]) -> StorageClassDevice {
    StorageClassDevice {
        storage_class_name: storage_class.to_string(),
        volume_mode,
        fs_type: None,
        device_paths: paths.iter().map(|path| path.to_string()).collect(),
        force_wipe_devices_and_destroy_all_data: None,
    }
}

pub fn local_volume(name: &str, devices: Vec<StorageClassDevice>) -> LocalVolume {
    let mut lv = LocalVolume::new(
        name,
        LocalVolumeSpec {
            node_selector: None,
            storage_class_devices: devices,
        },
    );
    lv.metadata.namespace = Some(NAMESPACE.to_string());
    lv.metadata.uid = Some(format!("lv-{name}"));
    lv.metadata.generation = Some(1);
    lv
}

pub fn local_volume_set(
    name: &str,
    storage_class: &str,
    inclusion: Option<DeviceInclusionSpec>,
    max_device_count: Option<i32>,
) -> LocalVolumeSet {
    let mut lvset = LocalVolumeSet::new(
        name,
        LocalVolumeSetSpec {
            storage_class_name: storage_class.to_string(),
            volume_mode: VolumeMode::Block,
            fs_type: None,
            node_selector: None,
            device_inclusion_spec: inclusion,
            max_device_count,
        },
    );
    lvset.metadata.namespace = Some(NAMESPACE.to_string());
    lvset.metadata.uid = Some(format!("lvset-{name}"));
    lvset.metadata.generation = Some(1);
    lvset
}
