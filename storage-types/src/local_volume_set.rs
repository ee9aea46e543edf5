// SPDX-License-Identifier: GPL-3.0-only

//! `LocalVolumeSet` custom resource: selector-based device set for one
//! storage class.

use k8s_openapi::api::core::v1::NodeSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::conditions::OperatorCondition;
use crate::inclusion::DeviceInclusionSpec;
use crate::volume::VolumeMode;

pub const LOCAL_VOLUME_SET_KIND: &str = "LocalVolumeSet";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "local.storage.openshift.io",
    version = "v1alpha1",
    kind = "LocalVolumeSet",
    plural = "localvolumesets",
    namespaced,
    status = "LocalVolumeSetStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeSetSpec {
    pub storage_class_name: String,

    #[serde(default)]
    pub volume_mode: VolumeMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<NodeSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_inclusion_spec: Option<DeviceInclusionSpec>,

    /// Upper bound on devices symlinked per node for this set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_device_count: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeSetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_provisioned_device_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperatorCondition>,
}

impl LocalVolumeSet {
    /// The inclusion spec, or the default (disks only) when none is declared.
    pub fn inclusion_spec(&self) -> DeviceInclusionSpec {
        self.spec.device_inclusion_spec.clone().unwrap_or_default()
    }

    /// Cap on symlinked devices; negative values are treated as zero.
    pub fn max_device_count(&self) -> Option<usize> {
        self.spec
            .max_device_count
            .map(|count| usize::try_from(count).unwrap_or(0))
    }
}
