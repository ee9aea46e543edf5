// SPDX-License-Identifier: GPL-3.0-only

//! Per-reconcile view of the node and the owner's storage classes

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, ObjectReference};
use kube::ResourceExt;
use storage_types::labels::HOSTNAME_LABEL;
use storage_types::{MountConfig, OwnerIdentity, VolumeMode, provisioner_name};

use crate::config::Settings;
use crate::context::DaemonContext;
use crate::error::{DiskmakerError, Result};
use crate::pv::with_timeout;

/// Rebuilt at the start of every reconcile.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub node: Node,
    pub node_name: String,

    /// Value of the `provisioned-by` annotation on this node's PVs
    pub provisioner_name: String,

    pub owner: OwnerIdentity,

    /// Object that diagnostic events are attached to
    pub regarding: ObjectReference,

    /// Storage class name to publishing configuration
    pub mount_configs: BTreeMap<String, MountConfig>,
}

impl RuntimeConfig {
    pub async fn load(
        ctx: &DaemonContext,
        owner: OwnerIdentity,
        regarding: ObjectReference,
        mount_configs: BTreeMap<String, MountConfig>,
    ) -> Result<Self> {
        let node_name = ctx.settings.node_name.clone();
        let node = with_timeout("get node", ctx.api.get_node(&node_name)).await?;
        let uid = node.uid().unwrap_or_default();

        Ok(Self {
            provisioner_name: provisioner_name(&node_name, &uid),
            node,
            node_name,
            owner,
            regarding,
            mount_configs,
        })
    }

    pub fn node_labels(&self) -> &BTreeMap<String, String> {
        self.node.labels()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.node_labels().get(HOSTNAME_LABEL).map(String::as_str)
    }

    pub fn mount_config(&self, storage_class: &str) -> Result<&MountConfig> {
        self.mount_configs
            .get(storage_class)
            .ok_or_else(|| DiskmakerError::MissingMountConfig(storage_class.to_string()))
    }
}

/// Publishing configuration of one class under the symlink root.
pub fn mount_config_for(
    settings: &Settings,
    storage_class: &str,
    volume_mode: VolumeMode,
    fs_type: Option<&str>,
) -> MountConfig {
    let dir = settings.class_dir(storage_class).to_string_lossy().to_string();
    MountConfig {
        host_dir: dir.clone(),
        mount_dir: dir,
        volume_mode,
        fs_type: fs_type.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_configs_live_under_the_symlink_root() {
        let settings = Settings::new("worker-0", "/mnt/local-storage");
        let config = mount_config_for(&settings, "fast", VolumeMode::Filesystem, Some("xfs"));
        assert_eq!(config.host_dir, "/mnt/local-storage/fast");
        assert_eq!(config.mount_dir, config.host_dir);
        assert_eq!(config.effective_fs_type().as_deref(), Some("xfs"));
    }
}
