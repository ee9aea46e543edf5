// SPDX-License-Identifier: GPL-3.0-only

//! `LocalVolumeSet`: every node device matching an inclusion spec, up to an
//! optional per-node cap

use std::collections::{BTreeMap, HashSet};

use kube::Resource;
use storage_types::{
    LOCAL_VOLUME_SET_KIND, LocalVolumeSet, LocalVolumeSetStatus, OwnerIdentity, events,
    node_matches,
};
use tracing::{debug, info, instrument};

use crate::classify::{HostProbe, Verdict, apply_filters, apply_matchers};
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

#[instrument(skip(ctx), fields(node = %ctx.settings.node_name))]
pub async fn reconcile_local_volume_set(
    ctx: &DaemonContext,
    namespace: &str,
    name: &str,
) -> Result<Requeue> {
    let owner = OwnerIdentity::new(LOCAL_VOLUME_SET_KIND, namespace, name);
    let Some(mut lvset) = with_timeout(
        "get LocalVolumeSet",
        ctx.api.get_local_volume_set(namespace, name),
    )
    .await?
    else {
        info!(%owner, "owner gone, deregistering");
        ctx.owner_index.deregister(&owner);
        ctx.metrics.remove_owner(&owner);
        return Ok(Requeue::AwaitChange);
    };

    let class_name = lvset.spec.storage_class_name.clone();
    ctx.owner_index.register(&class_name, &owner);

    let mount_configs = BTreeMap::from([(
        class_name.clone(),
        mount_config_for(
            &ctx.settings,
            &class_name,
            lvset.spec.volume_mode,
            lvset.spec.fs_type.as_deref(),
        ),
    )]);
    let rt = RuntimeConfig::load(ctx, owner.clone(), lvset.object_ref(&()), mount_configs).await?;
    ensure_cache_populated(ctx, &rt).await?;

    match node_matches(lvset.spec.node_selector.as_ref(), &rt.node_name, rt.node_labels()) {
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

    let deleting = lvset.metadata.deletion_timestamp.is_some();
    if deleting && !has_finalizer(&lvset.metadata) {
        return Ok(Requeue::AwaitChange);
    }
    if !deleting && add_finalizer(&mut lvset.metadata) {
        lvset = with_timeout(
            "update LocalVolumeSet",
            ctx.api.update_local_volume_set(&lvset),
        )
        .await?;
    }

    ctx.deleter.delete_pvs(&rt.provisioner_name).await;

    if deleting {
        let owned = teardown::owned_pvs(ctx, &rt).await?;
        let live = teardown::pv_names(&owned);
        cleanup_symlinks(ctx, &rt, &class_name, &HashSet::new(), Some(&live)).await?;

        return match teardown::run(ctx, &rt, owned).await? {
            TeardownState::Blocked => Ok(Requeue::After(DEFAULT_REQUEUE)),
            TeardownState::Pending => Ok(Requeue::After(FAST_REQUEUE)),
            TeardownState::Complete => {
                if remove_finalizer(&mut lvset.metadata) {
                    with_timeout(
                        "update LocalVolumeSet",
                        ctx.api.update_local_volume_set(&lvset),
                    )
                    .await?;
                    info!(%owner, "teardown complete, finalizer removed");
                }
                ctx.metrics.remove_owner(&owner);
                Ok(Requeue::AwaitChange)
            }
        };
    }

    let listing = match ctx.lister.list_devices(&[]).await {
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

    let valid: HashSet<String> = listing
        .devices
        .iter()
        .map(|device| device.kernel_name.clone())
        .collect();
    let orphaned = cleanup_symlinks(ctx, &rt, &class_name, &valid, None).await?;

    let mut pacing = CyclePacing::default();
    if let Some(storage_class) = storage_class(ctx, &rt, &class_name).await? {
        let target = ClassTarget {
            storage_class: &storage_class,
            storage_class_name: &class_name,
            mount_config: rt.mount_config(&class_name)?,
            class_dir: ctx.settings.class_dir(&class_name),
            force_wipe: false,
        };
        let mounts = load_host_mounts(&ctx.settings.host_paths)?;
        let probe = HostProbe {
            paths: &ctx.settings.host_paths,
            mounts: &mounts,
        };
        let inclusion = lvset.inclusion_spec();
        let max_devices = lvset.max_device_count();

        let linked = linked_devices(&target.class_dir)?;
        let mut provisioned = linked.len();
        let mut unmatched = 0;
        for device in &listing.devices {
            let kernel_name = device.kernel_name.as_str();
            if let Some(link) = linked.get(kernel_name) {
                publish_linked(ctx, &rt, &target, kernel_name, link, &mut pacing).await;
                continue;
            }

            match apply_filters(device, &probe) {
                Verdict::Accepted => {}
                Verdict::Rejected { rule } => {
                    debug!(device = kernel_name, rule, "device filtered out");
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

            match apply_matchers(device, &inclusion) {
                Verdict::Accepted => {}
                Verdict::Rejected { rule } => {
                    debug!(device = kernel_name, rule, "device not matched");
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

            if max_devices.is_some_and(|max| provisioned >= max) {
                debug!(device = kernel_name, provisioned, "device cap reached");
                continue;
            }

            if claim_device(ctx, &rt, &target, device, None, &mut pacing)
                .await
                .is_linked()
            {
                provisioned += 1;
            }
        }

        ctx.metrics.record(
            GaugeKey {
                owner: owner.clone(),
                storage_class: class_name.clone(),
                node: rt.node_name.clone(),
            },
            ProvisionGauges {
                provisioned,
                orphaned_symlinks: orphaned,
                unmatched_devices: unmatched,
            },
        );
    }

    update_status(ctx, &rt, lvset).await?;
    Ok(pacing.requeue(ctx.settings.device_min_age))
}

/// Record the cluster-wide count of PVs labeled with this set.
async fn update_status(ctx: &DaemonContext, rt: &RuntimeConfig, mut lvset: LocalVolumeSet) -> Result<()> {
    let owned = teardown::owned_pvs(ctx, rt).await?;
    let count = i32::try_from(owned.len()).unwrap_or(i32::MAX);
    let generation = lvset.metadata.generation;

    let status = lvset.status.get_or_insert_with(LocalVolumeSetStatus::default);
    if status.total_provisioned_device_count == Some(count)
        && status.observed_generation == generation
    {
        return Ok(());
    }
    status.total_provisioned_device_count = Some(count);
    status.observed_generation = generation;

    with_timeout(
        "update LocalVolumeSet status",
        ctx.api.update_local_volume_set_status(&lvset),
    )
    .await?;
    debug!(owner = %rt.owner, count, "updated provisioned device count");
    Ok(())
}
