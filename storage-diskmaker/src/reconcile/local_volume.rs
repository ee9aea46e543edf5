// SPDX-License-Identifier: GPL-3.0-only

//! `LocalVolume`: explicit device paths per storage class

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::Utc;
use kube::Resource;
use storage_sys::{ResolvedDevice, resolve_device_path};
use storage_types::{
    LOCAL_VOLUME_KIND, LocalVolume, LocalVolumeStatus, OperatorCondition, OwnerIdentity,
    StorageClassDevice, events, node_matches, set_condition,
};
use tracing::{debug, info, instrument};

use crate::classify::{HostProbe, NO_FILESYSTEM_SIGNATURE, Verdict, apply_filters_except};
use crate::context::DaemonContext;
use crate::error::Result;
use crate::metrics::{GaugeKey, ProvisionGauges};
use crate::pv::with_timeout;
use crate::runtime::{RuntimeConfig, mount_config_for};

use super::provision::{ClassTarget, claim_device, publish_linked};
use super::symlinks::{cleanup_symlinks, linked_devices};
use super::teardown::{self, TeardownState};
use super::{
    CyclePacing, DEFAULT_REQUEUE, FAST_REQUEUE, Requeue, add_finalizer, ensure_cache_populated,
    has_finalizer, load_host_mounts, note_device, remove_finalizer, storage_class, warn_device,
    warn_owner,
};

pub const CONDITION_AVAILABLE: &str = "Available";

/// Device paths of one class resolved to kernel devices.
struct DeclaredClass<'a> {
    devices: &'a StorageClassDevice,
    resolved: Vec<ResolvedDevice>,
}

#[instrument(skip(ctx), fields(node = %ctx.settings.node_name))]
pub async fn reconcile_local_volume(
    ctx: &DaemonContext,
    namespace: &str,
    name: &str,
) -> Result<Requeue> {
    let owner = OwnerIdentity::new(LOCAL_VOLUME_KIND, namespace, name);
    let Some(mut lv) =
        with_timeout("get LocalVolume", ctx.api.get_local_volume(namespace, name)).await?
    else {
        info!(%owner, "owner gone, deregistering");
        ctx.owner_index.deregister(&owner);
        ctx.metrics.remove_owner(&owner);
        return Ok(Requeue::AwaitChange);
    };

    for class in lv.storage_class_names() {
        ctx.owner_index.register(&class, &owner);
    }

    let mount_configs: BTreeMap<_, _> = lv
        .spec
        .storage_class_devices
        .iter()
        .map(|devices| {
            let class = devices.storage_class_name.as_str();
            (
                class.to_string(),
                mount_config_for(
                    &ctx.settings,
                    class,
                    devices.volume_mode,
                    devices.fs_type.as_deref(),
                ),
            )
        })
        .collect();
    let rt = RuntimeConfig::load(ctx, owner.clone(), lv.object_ref(&()), mount_configs).await?;
    ensure_cache_populated(ctx, &rt).await?;

    match node_matches(lv.spec.node_selector.as_ref(), &rt.node_name, rt.node_labels()) {
        Ok(true) => {}
        Ok(false) => {
            debug!("node not selected by owner");
            return Ok(Requeue::After(DEFAULT_REQUEUE));
        }
        Err(e) => {
            warn_owner(
                ctx,
                &rt,
                events::INVALID_NODE_SELECTOR,
                format!("cannot evaluate node selector: {e}"),
            )
            .await;
            return Ok(Requeue::After(DEFAULT_REQUEUE));
        }
    }

    let deleting = lv.metadata.deletion_timestamp.is_some();
    if deleting && !has_finalizer(&lv.metadata) {
        return Ok(Requeue::AwaitChange);
    }
    if !deleting && add_finalizer(&mut lv.metadata) {
        lv = with_timeout("update LocalVolume", ctx.api.update_local_volume(&lv)).await?;
    }

    ctx.deleter.delete_pvs(&rt.provisioner_name).await;

    let paths = &ctx.settings.host_paths;
    let mut declared = Vec::new();
    for devices in &lv.spec.storage_class_devices {
        let mut resolved = Vec::new();
        for path in &devices.device_paths {
            match resolve_device_path(paths, Path::new(path)) {
                Ok(device) => resolved.push(device),
                Err(e) if !deleting => {
                    warn_device(
                        ctx,
                        &rt,
                        events::ERROR_FINDING_MATCHING_DISK,
                        path,
                        format!("cannot use {path} for class {}: {e}", devices.storage_class_name),
                    )
                    .await;
                }
                Err(_) => {}
            }
        }
        declared.push(DeclaredClass { devices, resolved });
    }

    let owned = if deleting {
        Some(teardown::owned_pvs(ctx, &rt).await?)
    } else {
        None
    };
    let live_pvs = owned.as_deref().map(teardown::pv_names);

    let mut orphans = BTreeMap::new();
    for class in &declared {
        let valid: HashSet<String> = class
            .resolved
            .iter()
            .map(|device| device.kernel_name.clone())
            .collect();
        let name = class.devices.storage_class_name.as_str();
        let count = cleanup_symlinks(ctx, &rt, name, &valid, live_pvs.as_ref()).await?;
        orphans.insert(name, count);
    }

    if let Some(owned) = owned {
        return match teardown::run(ctx, &rt, owned).await? {
            TeardownState::Blocked => Ok(Requeue::After(DEFAULT_REQUEUE)),
            TeardownState::Pending => Ok(Requeue::After(FAST_REQUEUE)),
            TeardownState::Complete => {
                if remove_finalizer(&mut lv.metadata) {
                    with_timeout("update LocalVolume", ctx.api.update_local_volume(&lv)).await?;
                    info!(%owner, "teardown complete, finalizer removed");
                }
                ctx.metrics.remove_owner(&owner);
                Ok(Requeue::AwaitChange)
            }
        };
    }

    let dev_paths: Vec<String> = declared
        .iter()
        .flat_map(|class| class.resolved.iter())
        .map(|device| paths.device_node(&device.kernel_name).to_string_lossy().to_string())
        .collect();
    let listing = match ctx.lister.list_devices(&dev_paths).await {
        Ok(listing) => listing,
        Err(e) => {
            warn_owner(
                ctx,
                &rt,
                events::ERROR_RUNNING_BLOCK_LIST,
                format!("failed to list block devices: {e}"),
            )
            .await;
            return Err(e.into());
        }
    };
    if !listing.bad_rows.is_empty() {
        debug!(bad_rows = ?listing.bad_rows, "skipping unparseable block device rows");
    }

    let mounts = load_host_mounts(paths)?;
    let probe = HostProbe {
        paths,
        mounts: &mounts,
    };
    let mut pacing = CyclePacing::default();
    let mut provisioned = 0;

    for class in &declared {
        let class_name = class.devices.storage_class_name.as_str();
        let Some(storage_class) = storage_class(ctx, &rt, class_name).await? else {
            continue;
        };
        let target = ClassTarget {
            storage_class: &storage_class,
            storage_class_name: class_name,
            mount_config: rt.mount_config(class_name)?,
            class_dir: ctx.settings.class_dir(class_name),
            force_wipe: class.devices.force_wipe(),
        };
        let skip: &[&str] = if target.force_wipe {
            &[NO_FILESYSTEM_SIGNATURE]
        } else {
            &[]
        };

        let linked = linked_devices(&target.class_dir)?;
        let mut unmatched = 0;
        for resolved in &class.resolved {
            let kernel_name = resolved.kernel_name.as_str();
            if let Some(link) = linked.get(kernel_name) {
                publish_linked(ctx, &rt, &target, kernel_name, link, &mut pacing).await;
                continue;
            }

            let Some(device) = listing.devices.iter().find(|d| d.kernel_name == kernel_name) else {
                warn_device(
                    ctx,
                    &rt,
                    events::ERROR_FINDING_MATCHING_DISK,
                    kernel_name,
                    format!("{kernel_name} is not among the node's block devices"),
                )
                .await;
                unmatched += 1;
                continue;
            };

            match apply_filters_except(device, &probe, skip) {
                Verdict::Accepted => {}
                Verdict::Rejected { rule } => {
                    warn_device(
                        ctx,
                        &rt,
                        events::ERROR_FINDING_MATCHING_DISK,
                        kernel_name,
                        format!("{kernel_name} cannot be used: rejected by {rule}"),
                    )
                    .await;
                    unmatched += 1;
                    continue;
                }
                verdict @ Verdict::Failed { .. } => {
                    warn_device(
                        ctx,
                        &rt,
                        events::DEVICE_FILTER_ERROR,
                        kernel_name,
                        format!("{kernel_name}: {verdict}"),
                    )
                    .await;
                    unmatched += 1;
                    continue;
                }
            }

            if !ctx.ages.is_old_enough(kernel_name, ctx.settings.device_min_age) {
                note_device(
                    ctx,
                    &rt,
                    events::DISCOVERED_NEW_DEVICE,
                    kernel_name,
                    format!("{kernel_name} was just discovered, waiting before claiming it"),
                )
                .await;
                pacing.delayed_devices = true;
                continue;
            }

            claim_device(
                ctx,
                &rt,
                &target,
                device,
                resolved.path_by_id.as_deref(),
                &mut pacing,
            )
            .await;
        }

        let linked = linked_devices(&target.class_dir)?;
        provisioned += class
            .resolved
            .iter()
            .filter(|device| linked.contains_key(&device.kernel_name))
            .count();
        ctx.metrics.record(
            GaugeKey {
                owner: owner.clone(),
                storage_class: class_name.to_string(),
                node: rt.node_name.clone(),
            },
            ProvisionGauges {
                provisioned: linked.len(),
                orphaned_symlinks: orphans.get(class_name).copied().unwrap_or_default(),
                unmatched_devices: unmatched,
            },
        );
    }

    update_status(ctx, &rt, lv, provisioned).await?;
    Ok(pacing.requeue(ctx.settings.device_min_age))
}

/// Record the observed generation and whether every declared path is linked.
async fn update_status(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    mut lv: LocalVolume,
    provisioned: usize,
) -> Result<()> {
    let declared: usize = lv
        .spec
        .storage_class_devices
        .iter()
        .map(|devices| devices.device_paths.len())
        .sum();
    let message = format!("{provisioned} of {declared} declared devices provisioned");
    let condition = if provisioned >= declared {
        OperatorCondition::new(CONDITION_AVAILABLE, true, "DevicesProvisioned", message)
    } else {
        OperatorCondition::new(CONDITION_AVAILABLE, false, "DevicesPending", message)
    };

    let generation = lv.metadata.generation;
    let status = lv.status.get_or_insert_with(LocalVolumeStatus::default);
    let changed = set_condition(&mut status.conditions, condition, Utc::now());
    if !changed && status.observed_generation == generation {
        return Ok(());
    }
    status.observed_generation = generation;

    with_timeout(
        "update LocalVolume status",
        ctx.api.update_local_volume_status(&lv),
    )
    .await?;
    debug!(owner = %rt.owner, provisioned, declared, "updated LocalVolume status");
    Ok(())
}
