// SPDX-License-Identifier: GPL-3.0-only

mod common;

use std::collections::BTreeMap;

use common::{GIB, by_id_disk, label, published, reconcile_lv};
use k8s_openapi::api::core::v1::{LocalVolumeSource, PersistentVolume, PersistentVolumeSpec};
use kube::ResourceExt;
use kube::api::ObjectMeta;
use storage_diskmaker::deleter::CleanupState;
use storage_diskmaker::pv::pv_name;
use storage_testing::Harness;
use storage_testing::fixtures::{self, NAMESPACE, NODE_NAME};
use storage_types::labels::{DEVICE_ID_LABEL, PROVISIONED_BY_ANNOTATION};
use storage_types::{VolumeMode, events};

const CLASS: &str = "local-block";
const WWN: &str = "wwn-0x5000cca01d2e3f40";

fn single_disk(h: &Harness, mode: VolumeMode) {
    let sdb = by_id_disk(h, "sdb", WWN, 80 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    let path = h.host.paths.by_id_dir.join(WWN);
    h.cluster.insert_local_volume(fixtures::local_volume(
        "disks",
        vec![fixtures::class_devices(CLASS, mode, &[&path.to_string_lossy()])],
    ));
}

fn released_pv(
    h: &Harness,
    name: &str,
    reclaim_policy: &str,
    provisioner: &str,
    mode: VolumeMode,
) -> PersistentVolume {
    let pv = PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([(
                PROVISIONED_BY_ANNOTATION.to_string(),
                provisioner.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            persistent_volume_reclaim_policy: Some(reclaim_policy.to_string()),
            volume_mode: Some(mode.as_str().to_string()),
            storage_class_name: Some(CLASS.to_string()),
            local: Some(LocalVolumeSource {
                path: format!("/mnt/local-storage/{CLASS}/{name}"),
                fs_type: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    h.cluster.insert_pv(pv.clone());
    h.cluster.set_pv_phase(name, "Released");
    h.cluster.pv(name).unwrap()
}

#[tokio::test]
async fn running_cleanup_defers_publishing() {
    let h = Harness::new().unwrap();
    single_disk(&h, VolumeMode::Block);
    let name = pv_name(WWN, NODE_NAME, CLASS);
    assert!(h.ctx.cleanup.start(&name));

    reconcile_lv(&h, "disks").await;
    assert_eq!(h.host.links(CLASS), vec![WWN.to_string()]);
    assert!(h.cluster.pv(&name).is_none());

    h.ctx.cleanup.finish(&name, true);
    reconcile_lv(&h, "disks").await;
    assert!(h.cluster.pv(&name).is_some());
}

#[tokio::test]
async fn restores_missing_labels_on_existing_volume() {
    let h = Harness::new().unwrap();
    single_disk(&h, VolumeMode::Block);
    reconcile_lv(&h, "disks").await;

    let mut pv = published(&h, WWN, CLASS).unwrap();
    pv.labels_mut().remove(DEVICE_ID_LABEL);
    pv.spec.as_mut().unwrap().persistent_volume_reclaim_policy = Some("Retain".to_string());
    h.cluster.insert_pv(pv);

    let writes = h.cluster.writes();
    reconcile_lv(&h, "disks").await;
    assert_eq!(h.cluster.writes(), writes + 1);

    let pv = published(&h, WWN, CLASS).unwrap();
    assert_eq!(label(&pv, DEVICE_ID_LABEL), Some(WWN));
    // Only labels are merged; the rest of the object is left as found.
    assert_eq!(
        pv.spec.unwrap().persistent_volume_reclaim_policy.as_deref(),
        Some("Retain")
    );
}

#[tokio::test]
async fn block_volume_now_backed_by_a_filesystem_is_reported() {
    let h = Harness::new().unwrap();
    single_disk(&h, VolumeMode::Block);
    reconcile_lv(&h, "disks").await;
    assert!(published(&h, WWN, CLASS).is_some());

    let mut lv = h.cluster.local_volume(NAMESPACE, "disks").unwrap();
    lv.spec.storage_class_devices[0].volume_mode = VolumeMode::Filesystem;
    h.cluster.insert_local_volume(lv);
    h.volumes.set_filesystem("sdb", 80 * GIB, true);

    reconcile_lv(&h, "disks").await;

    assert_eq!(h.events.for_device(events::PV_MODE_MISMATCH, "sdb").len(), 1);
    let pv = published(&h, WWN, CLASS).unwrap();
    assert_eq!(pv.spec.unwrap().volume_mode.as_deref(), Some("Block"));
}

#[tokio::test]
async fn missing_reclaim_policy_defaults_to_delete() {
    let h = Harness::new().unwrap();
    let sdb = by_id_disk(&h, "sdb", WWN, 80 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster.insert_storage_class(fixtures::storage_class(CLASS, None));
    let path = h.host.paths.by_id_dir.join(WWN);
    h.cluster.insert_local_volume(fixtures::local_volume(
        "disks",
        vec![fixtures::class_devices(CLASS, VolumeMode::Block, &[&path.to_string_lossy()])],
    ));

    reconcile_lv(&h, "disks").await;

    let pv = published(&h, WWN, CLASS).unwrap();
    assert_eq!(
        pv.spec.unwrap().persistent_volume_reclaim_policy.as_deref(),
        Some("Delete")
    );
    assert_eq!(h.events.count(events::MISSING_RECLAIM_POLICY), 1);
}

#[tokio::test]
async fn deletes_only_reclaimable_released_volumes() {
    let h = Harness::new().unwrap();
    let ours = h.provisioner_name();
    released_pv(&h, "local-pv-delete", "Delete", &ours, VolumeMode::Block);
    released_pv(&h, "local-pv-retain", "Retain", &ours, VolumeMode::Block);
    released_pv(&h, "local-pv-fs", "Delete", &ours, VolumeMode::Filesystem);
    released_pv(
        &h,
        "local-pv-foreign",
        "Delete",
        "local-volume-provisioner-other",
        VolumeMode::Block,
    );
    h.sync_cache();
    // The cache only tracks volumes published by this node.
    h.ctx.cache.add_or_update(h.cluster.pv("local-pv-foreign").unwrap());

    h.ctx.deleter.delete_pvs(&ours).await;

    assert!(h.cluster.pv("local-pv-delete").is_none());
    assert!(h.cluster.pv("local-pv-retain").is_some());
    assert!(h.cluster.pv("local-pv-fs").is_some());
    assert!(h.cluster.pv("local-pv-foreign").is_some());
    assert_eq!(h.ctx.cleanup.state("local-pv-delete"), Some(CleanupState::Succeeded));
    assert_eq!(h.ctx.cleanup.state("local-pv-retain"), None);
    assert_eq!(h.ctx.cleanup.state("local-pv-fs"), None);
    assert_eq!(
        h.wiper.wiped(),
        vec![h.host.class_dir(CLASS).join("local-pv-delete")]
    );
}

#[tokio::test]
async fn failed_wipe_keeps_the_released_volume() {
    let h = Harness::new().unwrap();
    let ours = h.provisioner_name();
    released_pv(&h, "local-pv-delete", "Delete", &ours, VolumeMode::Block);
    h.sync_cache();
    h.wiper.fail_with("wipefs: device busy");

    h.ctx.deleter.delete_pvs(&ours).await;

    assert!(h.cluster.pv("local-pv-delete").is_some());
    assert_eq!(h.ctx.cleanup.state("local-pv-delete"), Some(CleanupState::Failed));

    // A failed cleanup is retried on the next pass.
    h.wiper.recover();
    h.ctx.deleter.delete_pvs(&ours).await;
    assert!(h.cluster.pv("local-pv-delete").is_none());
    assert_eq!(h.wiper.wiped().len(), 2);
}

#[tokio::test]
async fn released_volume_is_republished_fresh() {
    let h = Harness::new().unwrap();
    single_disk(&h, VolumeMode::Block);
    reconcile_lv(&h, "disks").await;

    let name = published(&h, WWN, CLASS).unwrap().name_any();
    h.cluster.set_pv_phase(&name, "Released");
    h.sync_cache();

    reconcile_lv(&h, "disks").await;

    let link = h.host.class_dir(CLASS).join(WWN);
    assert_eq!(h.wiper.wiped(), vec![link]);
    let pv = h.cluster.pv(&name).expect("republished");
    assert_eq!(
        pv.status.and_then(|status| status.phase).as_deref(),
        Some("Available")
    );
    assert_eq!(h.host.links(CLASS), vec![WWN.to_string()]);
}
