// SPDX-License-Identifier: GPL-3.0-only

#![allow(dead_code)]

use k8s_openapi::api::core::v1::PersistentVolume;
use storage_diskmaker::pv::pv_name;
use storage_diskmaker::{Requeue, reconcile_local_volume, reconcile_local_volume_set};
use storage_testing::Harness;
use storage_testing::fixtures::{self, NAMESPACE, NODE_NAME};
use storage_types::BlockDevice;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Disk with a by-id link, visible to the lister and sized for the probes.
pub fn by_id_disk(h: &Harness, kernel_name: &str, id: &str, size_bytes: u64) -> BlockDevice {
    h.host.add_device(kernel_name).expect("device node");
    h.host.add_by_id(id, kernel_name).expect("by-id link");
    h.volumes.set_block(kernel_name, size_bytes);
    fixtures::disk(kernel_name, size_bytes)
}

/// Disk reachable only through its kernel name.
pub fn bare_disk(h: &Harness, kernel_name: &str, size_bytes: u64) -> BlockDevice {
    h.host.add_device(kernel_name).expect("device node");
    h.volumes.set_block(kernel_name, size_bytes);
    fixtures::disk(kernel_name, size_bytes)
}

pub async fn reconcile_lv(h: &Harness, name: &str) -> Requeue {
    reconcile_local_volume(&h.ctx, NAMESPACE, name)
        .await
        .expect("LocalVolume reconcile")
}

pub async fn reconcile_lvset(h: &Harness, name: &str) -> Requeue {
    reconcile_local_volume_set(&h.ctx, NAMESPACE, name)
        .await
        .expect("LocalVolumeSet reconcile")
}

/// PV published for the link `base` under `storage_class`.
pub fn published(h: &Harness, base: &str, storage_class: &str) -> Option<PersistentVolume> {
    h.cluster.pv(&pv_name(base, NODE_NAME, storage_class))
}

pub fn label<'a>(pv: &'a PersistentVolume, key: &str) -> Option<&'a str> {
    pv.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

pub fn capacity(pv: &PersistentVolume) -> Option<String> {
    pv.spec
        .as_ref()
        .and_then(|spec| spec.capacity.as_ref())
        .and_then(|capacity| capacity.get("storage"))
        .map(|quantity| quantity.0.clone())
}
