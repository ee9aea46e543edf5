// SPDX-License-Identifier: GPL-3.0-only

mod common;

use common::{GIB, by_id_disk, published, reconcile_lv, reconcile_lvset};
use kube::ResourceExt;
use storage_diskmaker::Requeue;
use storage_diskmaker::reconcile::{DEFAULT_REQUEUE, FAST_REQUEUE};
use storage_testing::Harness;
use storage_testing::fixtures::{self, NAMESPACE};
use storage_types::local_volume::LOCAL_VOLUME_KIND;
use storage_types::local_volume_set::LOCAL_VOLUME_SET_KIND;
use storage_types::{OwnerIdentity, VolumeMode, events};

const CLASS: &str = "local-block";

/// One LocalVolume `disks` with two by-id disks, already published.
async fn provisioned(reclaim_policy: &str) -> Harness {
    let h = Harness::new().unwrap();
    let sdb = by_id_disk(&h, "sdb", "wwn-0x1000", 50 * GIB);
    let sdc = by_id_disk(&h, "sdc", "wwn-0x2000", 50 * GIB);
    h.lister.set_devices(vec![sdb, sdc]);

    let mut class = fixtures::storage_class(CLASS, Some(reclaim_policy));
    class.metadata.labels = Some(OwnerIdentity::new(LOCAL_VOLUME_KIND, NAMESPACE, "disks").labels());
    h.cluster.insert_storage_class(class);

    let paths: Vec<String> = ["wwn-0x1000", "wwn-0x2000"]
        .iter()
        .map(|id| h.host.paths.by_id_dir.join(id).to_string_lossy().to_string())
        .collect();
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    h.cluster.insert_local_volume(fixtures::local_volume(
        "disks",
        vec![fixtures::class_devices(CLASS, VolumeMode::Block, &paths)],
    ));

    reconcile_lv(&h, "disks").await;
    assert_eq!(h.cluster.pvs().len(), 2);
    h.sync_cache();
    h
}

#[tokio::test]
async fn bound_volume_blocks_deletion() {
    let h = provisioned("Delete").await;
    let bound = published(&h, "wwn-0x1000", CLASS).unwrap().name_any();
    h.cluster.set_pv_phase(&bound, "Bound");
    h.cluster.mark_local_volume_deleting(NAMESPACE, "disks");

    assert_eq!(reconcile_lv(&h, "disks").await, Requeue::After(DEFAULT_REQUEUE));

    assert_eq!(h.events.count(events::DELETION_BLOCKED), 1);
    assert!(h.cluster.local_volume(NAMESPACE, "disks").is_some());
    assert_eq!(h.host.links(CLASS).len(), 2);
    // Nothing is released while anything is still bound.
    assert_eq!(h.events.count(events::RELEASED_AVAILABLE_PV), 0);
}

#[tokio::test]
async fn retained_volumes_block_deletion() {
    let h = provisioned("Retain").await;
    h.cluster.mark_local_volume_deleting(NAMESPACE, "disks");

    assert_eq!(reconcile_lv(&h, "disks").await, Requeue::After(DEFAULT_REQUEUE));

    assert_eq!(h.events.count(events::DELETION_BLOCKED), 1);
    assert!(h.cluster.local_volume(NAMESPACE, "disks").is_some());
    assert!(h.cluster.storage_class(CLASS).is_some());
}

#[tokio::test]
async fn releases_volumes_then_drops_the_finalizer() {
    let h = provisioned("Delete").await;
    h.cluster.mark_local_volume_deleting(NAMESPACE, "disks");

    // Available volumes get a synthetic claim so the volume controller releases them.
    assert_eq!(reconcile_lv(&h, "disks").await, Requeue::After(FAST_REQUEUE));
    assert_eq!(h.events.count(events::RELEASED_AVAILABLE_PV), 2);
    for pv in h.cluster.pvs() {
        let claim = pv.spec.and_then(|spec| spec.claim_ref).expect("claim ref");
        assert!(claim.name.unwrap().starts_with("release-"));
    }
    assert_eq!(h.host.links(CLASS).len(), 2);

    for pv in h.cluster.pvs() {
        h.cluster.set_pv_phase(&pv.name_any(), "Released");
    }
    h.sync_cache();

    assert_eq!(reconcile_lv(&h, "disks").await, Requeue::AwaitChange);
    assert!(h.cluster.pvs().is_empty());
    assert!(h.host.links(CLASS).is_empty());
    assert!(!h.host.class_dir(CLASS).exists());
    assert!(h.cluster.storage_class(CLASS).is_none());
    assert!(h.cluster.local_volume(NAMESPACE, "disks").is_none());
}

#[tokio::test]
async fn volume_set_teardown_removes_its_links() {
    let h = Harness::new().unwrap();
    let sdb = by_id_disk(&h, "sdb", "wwn-0x3000", 50 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster
        .insert_storage_class(fixtures::storage_class("local-ssd", Some("Delete")));
    h.cluster
        .insert_local_volume_set(fixtures::local_volume_set("ssds", "local-ssd", None, None));

    reconcile_lvset(&h, "ssds").await;
    assert_eq!(h.host.links("local-ssd").len(), 1);
    h.sync_cache();

    h.cluster.mark_local_volume_set_deleting(NAMESPACE, "ssds");
    assert_eq!(reconcile_lvset(&h, "ssds").await, Requeue::After(FAST_REQUEUE));

    let name = published(&h, "wwn-0x3000", "local-ssd").unwrap().name_any();
    h.cluster.set_pv_phase(&name, "Released");
    h.sync_cache();

    assert_eq!(reconcile_lvset(&h, "ssds").await, Requeue::AwaitChange);
    assert!(h.cluster.pvs().is_empty());
    assert!(h.host.links("local-ssd").is_empty());
    assert!(h.cluster.local_volume_set(NAMESPACE, "ssds").is_none());
    // Not labeled with the set, so the class stays.
    assert!(h.cluster.storage_class("local-ssd").is_some());
    let owner = OwnerIdentity::new(LOCAL_VOLUME_SET_KIND, NAMESPACE, "ssds");
    assert!(h.ctx.owner_index.owners_for("local-ssd").contains(&owner));

    // The follow-up event for the vanished set drops it from the index.
    assert_eq!(reconcile_lvset(&h, "ssds").await, Requeue::AwaitChange);
    assert!(h.ctx.owner_index.owners_for("local-ssd").is_empty());
}
