// SPDX-License-Identifier: GPL-3.0-only

mod common;

use std::time::Duration;

use common::{GIB, bare_disk, by_id_disk, published, reconcile_lvset};
use k8s_openapi::api::core::v1::{NodeSelector, NodeSelectorRequirement, NodeSelectorTerm};
use storage_diskmaker::Requeue;
use storage_diskmaker::reconcile::DEFAULT_REQUEUE;
use storage_testing::Harness;
use storage_testing::fixtures::{self, NAMESPACE};
use storage_types::labels::OWNER_FINALIZER;
use storage_types::{DeviceInclusionSpec, DeviceMechanicalProperty, DeviceType, events};

const CLASS: &str = "local-ssd";

fn provisioned_count(h: &Harness, name: &str) -> Option<i32> {
    h.cluster
        .local_volume_set(NAMESPACE, name)
        .and_then(|lvset| lvset.status)
        .and_then(|status| status.total_provisioned_device_count)
}

#[tokio::test]
async fn honors_max_device_count() {
    let h = Harness::new().unwrap();
    let disks = ["sdb", "sdc", "sdd", "sde"]
        .iter()
        .map(|kname| bare_disk(&h, kname, 200 * GIB))
        .collect();
    h.lister.set_devices(disks);
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    h.cluster
        .insert_local_volume_set(fixtures::local_volume_set("ssds", CLASS, None, Some(2)));

    reconcile_lvset(&h, "ssds").await;
    assert_eq!(h.host.links(CLASS), vec!["sdb".to_string(), "sdc".to_string()]);
    assert_eq!(h.cluster.pvs().len(), 2);
    assert_eq!(provisioned_count(&h, "ssds"), Some(2));

    let lvset = h.cluster.local_volume_set(NAMESPACE, "ssds").unwrap();
    assert!(lvset.metadata.finalizers.unwrap().contains(&OWNER_FINALIZER.to_string()));
    assert_eq!(lvset.status.unwrap().observed_generation, Some(1));

    // A steady cycle leaves the count alone.
    let writes = h.cluster.writes();
    reconcile_lvset(&h, "ssds").await;
    assert_eq!(h.cluster.writes(), writes);

    let mut lvset = h.cluster.local_volume_set(NAMESPACE, "ssds").unwrap();
    lvset.spec.max_device_count = Some(3);
    h.cluster.insert_local_volume_set(lvset);

    reconcile_lvset(&h, "ssds").await;
    assert_eq!(h.host.links(CLASS).len(), 3);
    assert!(published(&h, "sdd", CLASS).is_some());
    assert!(published(&h, "sde", CLASS).is_none());
    assert_eq!(provisioned_count(&h, "ssds"), Some(3));
}

#[tokio::test]
async fn inclusion_spec_narrows_the_set() {
    let h = Harness::new().unwrap();
    let small = bare_disk(&h, "sdb", 5 * GIB);
    let mut spinning = bare_disk(&h, "sdc", 500 * GIB);
    spinning.rotational = "1".to_string();
    let mut other_vendor = bare_disk(&h, "sdd", 500 * GIB);
    other_vendor.vendor = "QEMU".to_string();
    let wanted = by_id_disk(&h, "sde", "wwn-0x50014ee2b0c1d2e3", 500 * GIB);
    let mut partition = bare_disk(&h, "sdf1", 500 * GIB);
    partition.device_type = DeviceType::Part;
    h.lister
        .set_devices(vec![small, spinning, other_vendor, wanted, partition]);

    let inclusion = DeviceInclusionSpec {
        device_mechanical_properties: Some(vec![DeviceMechanicalProperty::NonRotational]),
        min_size: Some("10Gi".to_string()),
        vendors: Some(vec!["ata".to_string()]),
        ..Default::default()
    };
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    h.cluster.insert_local_volume_set(fixtures::local_volume_set(
        "ssds",
        CLASS,
        Some(inclusion),
        None,
    ));

    reconcile_lvset(&h, "ssds").await;

    assert_eq!(h.host.links(CLASS), vec!["wwn-0x50014ee2b0c1d2e3".to_string()]);
    assert_eq!(h.cluster.pvs().len(), 1);
    // Rejections by the set's own policy are not reported as events.
    assert_eq!(h.events.count(events::ERROR_FINDING_MATCHING_DISK), 0);
}

#[tokio::test]
async fn skips_disks_with_partitions_or_signatures() {
    let h = Harness::new().unwrap();
    let partitioned = bare_disk(&h, "sdb", 100 * GIB);
    h.host.add_partition("sdb", "sdb1").unwrap();
    let mut formatted = bare_disk(&h, "sdc", 100 * GIB);
    formatted.fs_type = "ext4".to_string();
    let clean = bare_disk(&h, "sdd", 100 * GIB);
    h.lister.set_devices(vec![partitioned, formatted, clean]);
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    h.cluster
        .insert_local_volume_set(fixtures::local_volume_set("ssds", CLASS, None, None));

    reconcile_lvset(&h, "ssds").await;

    assert_eq!(h.host.links(CLASS), vec!["sdd".to_string()]);
    assert!(h.wiper.wiped().is_empty());
}

#[tokio::test]
async fn waits_for_new_devices_to_settle() {
    let h = Harness::with_device_min_age(Duration::from_secs(60)).unwrap();
    let sdb = bare_disk(&h, "sdb", 100 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    h.cluster
        .insert_local_volume_set(fixtures::local_volume_set("ssds", CLASS, None, None));

    assert_eq!(
        reconcile_lvset(&h, "ssds").await,
        Requeue::After(Duration::from_secs(30))
    );
    assert!(h.host.links(CLASS).is_empty());
    assert_eq!(h.events.for_device(events::DISCOVERED_NEW_DEVICE, "sdb").len(), 1);

    h.clock.advance(Duration::from_secs(30));
    reconcile_lvset(&h, "ssds").await;
    assert!(h.host.links(CLASS).is_empty());

    h.clock.advance(Duration::from_secs(31));
    reconcile_lvset(&h, "ssds").await;
    assert_eq!(h.host.links(CLASS), vec!["sdb".to_string()]);
    assert!(published(&h, "sdb", CLASS).is_some());
}

#[tokio::test]
async fn missing_storage_class_links_nothing() {
    let h = Harness::new().unwrap();
    let sdb = bare_disk(&h, "sdb", 100 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster
        .insert_local_volume_set(fixtures::local_volume_set("ssds", CLASS, None, None));

    reconcile_lvset(&h, "ssds").await;

    assert!(h.host.links(CLASS).is_empty());
    assert_eq!(h.events.count(events::ERROR_PROVISIONING_DEVICE), 1);
    assert_eq!(provisioned_count(&h, "ssds"), Some(0));
}

#[tokio::test]
async fn device_linked_by_another_class_is_left_alone() {
    let h = Harness::new().unwrap();
    let sdb = bare_disk(&h, "sdb", 100 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    h.cluster
        .insert_storage_class(fixtures::storage_class("local-other", Some("Delete")));
    h.cluster
        .insert_local_volume_set(fixtures::local_volume_set("first", CLASS, None, None));
    h.cluster.insert_local_volume_set(fixtures::local_volume_set(
        "second",
        "local-other",
        None,
        None,
    ));

    reconcile_lvset(&h, "first").await;
    reconcile_lvset(&h, "second").await;

    assert_eq!(h.host.links(CLASS), vec!["sdb".to_string()]);
    assert!(h.host.links("local-other").is_empty());
    assert_eq!(h.cluster.pvs().len(), 1);
}

#[tokio::test]
async fn unknown_selector_operator_is_reported_and_requeued() {
    let h = Harness::new().unwrap();
    let sdb = bare_disk(&h, "sdb", 100 * GIB);
    h.lister.set_devices(vec![sdb]);
    h.cluster
        .insert_storage_class(fixtures::storage_class(CLASS, Some("Delete")));
    let mut lvset = fixtures::local_volume_set("ssds", CLASS, None, None);
    lvset.spec.node_selector = Some(NodeSelector {
        node_selector_terms: vec![NodeSelectorTerm {
            match_expressions: Some(vec![NodeSelectorRequirement {
                key: "topology.kubernetes.io/zone".to_string(),
                operator: "Near".to_string(),
                values: Some(vec!["zone-a".to_string()]),
            }]),
            match_fields: None,
        }],
    });
    h.cluster.insert_local_volume_set(lvset);

    assert_eq!(
        reconcile_lvset(&h, "ssds").await,
        Requeue::After(DEFAULT_REQUEUE)
    );
    assert_eq!(h.events.count(events::INVALID_NODE_SELECTOR), 1);
    assert!(h.host.links(CLASS).is_empty());
}
