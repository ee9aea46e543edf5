// SPDX-License-Identifier: GPL-3.0-only

//! `LocalVolume` custom resource: explicit device paths per storage class.

use k8s_openapi::api::core::v1::NodeSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::conditions::OperatorCondition;
use crate::volume::VolumeMode;

pub const LOCAL_VOLUME_KIND: &str = "LocalVolume";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "local.storage.openshift.io",
    version = "v1",
    kind = "LocalVolume",
    plural = "localvolumes",
    namespaced,
    status = "LocalVolumeStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeSpec {
    /// Restricts the nodes this declaration applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<NodeSelector>,

    #[serde(default)]
    pub storage_class_devices: Vec<StorageClassDevice>,
}

/// Devices published under a single storage class.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassDevice {
    pub storage_class_name: String,

    #[serde(default)]
    pub volume_mode: VolumeMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,

    /// Kernel paths (`/dev/sdb`) or stable paths (`/dev/disk/by-id/...`)
    #[serde(default)]
    pub device_paths: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_wipe_devices_and_destroy_all_data: Option<bool>,
}

impl StorageClassDevice {
    pub fn force_wipe(&self) -> bool {
        self.force_wipe_devices_and_destroy_all_data.unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperatorCondition>,
}

impl LocalVolume {
    /// Storage class names declared by this volume, in declaration order.
    pub fn storage_class_names(&self) -> Vec<String> {
        self.spec
            .storage_class_devices
            .iter()
            .map(|devices| devices.storage_class_name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn crd_metadata() {
        assert_eq!(LocalVolume::group(&()), "local.storage.openshift.io");
        assert_eq!(LocalVolume::version(&()), "v1");
        assert_eq!(LocalVolume::kind(&()), LOCAL_VOLUME_KIND);
    }

    #[test]
    fn deserializes_storage_class_devices() {
        let spec: LocalVolumeSpec = serde_json::from_value(serde_json::json!({
            "storageClassDevices": [{
                "storageClassName": "local-block",
                "volumeMode": "Block",
                "devicePaths": ["/dev/sdb", "/dev/disk/by-id/wwn-0x5000"],
                "forceWipeDevicesAndDestroyAllData": true
            }]
        }))
        .expect("deserialize spec");

        let devices = &spec.storage_class_devices[0];
        assert_eq!(devices.volume_mode, VolumeMode::Block);
        assert_eq!(devices.device_paths.len(), 2);
        assert!(devices.force_wipe());
        assert!(spec.node_selector.is_none());
    }
}
