// SPDX-License-Identifier: GPL-3.0-only

//! Claiming one device: lock, symlink, publish

use std::path::{Path, PathBuf};

use k8s_openapi::api::storage::v1::StorageClass;
use storage_sys::{
    SymlinkOutcome, create_symlink, path_by_id, plan_symlink, pv_creation_lock,
};
use storage_types::{BlockDevice, MountConfig, events};
use tracing::debug;

use crate::context::DaemonContext;
use crate::pv::{LocalPvRequest, PvOutcome, create_or_update_pv};
use crate::runtime::RuntimeConfig;

use super::{CyclePacing, note_device, warn_device};

/// Storage class a device is claimed for.
pub struct ClassTarget<'a> {
    pub storage_class: &'a StorageClass,
    pub storage_class_name: &'a str,
    pub mount_config: &'a MountConfig,
    pub class_dir: PathBuf,
    pub force_wipe: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The device is linked under this class; the PV step may still have failed
    Linked(Option<PvOutcome>),

    /// Another class already links the device
    LinkedElsewhere,

    /// Open exclusively elsewhere with no symlink; retried next cycle
    Busy,

    Failed,
}

impl ClaimOutcome {
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Linked(_))
    }
}

/// Publish the PV for a device already linked under this class.
pub async fn publish_linked(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    target: &ClassTarget<'_>,
    kernel_name: &str,
    link: &Path,
    pacing: &mut CyclePacing,
) -> ClaimOutcome {
    let base = link
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let device_id = (base != kernel_name).then_some(base.as_str());
    ClaimOutcome::Linked(publish(ctx, rt, target, kernel_name, link, device_id, pacing).await)
}

/// Claim an unlinked device for `target`.
pub async fn claim_device(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    target: &ClassTarget<'_>,
    device: &BlockDevice,
    declared_by_id: Option<&Path>,
    pacing: &mut CyclePacing,
) -> ClaimOutcome {
    let paths = &ctx.settings.host_paths;
    let kernel_name = device.kernel_name.as_str();
    let dev_node = paths.device_node(kernel_name);

    let by_id = match path_by_id(paths, kernel_name, declared_by_id) {
        Ok(found) => found,
        Err(e) => {
            warn_device(
                ctx,
                rt,
                events::ERROR_LISTING_DEVICE_ID,
                kernel_name,
                format!("failed to look up a by-id path for {kernel_name}: {e}"),
            )
            .await;
            None
        }
    };
    let mut device = device.clone();
    device.path_by_id = by_id
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_default();

    let lock = match pv_creation_lock(&dev_node, &[ctx.settings.symlink_root.clone()]) {
        Ok(lock) => lock,
        Err(e) if e.is_transient() => {
            debug!(device = kernel_name, "device busy, retrying next cycle");
            return ClaimOutcome::Busy;
        }
        Err(e) => {
            warn_device(
                ctx,
                rt,
                events::ERROR_CREATING_SYMLINK,
                kernel_name,
                format!("failed to lock {}: {e}", dev_node.display()),
            )
            .await;
            return ClaimOutcome::Failed;
        }
    };

    let plan = plan_symlink(paths, &device, &target.class_dir);

    if lock.safe_to_claim() && target.force_wipe {
        if let Err(e) = ctx.wiper.wipe(&plan.source).await {
            warn_device(
                ctx,
                rt,
                events::ERROR_WIPING_DEVICE,
                kernel_name,
                format!("failed to wipe {}: {e}", plan.source.display()),
            )
            .await;
            return ClaimOutcome::Failed;
        }
    }

    let outcome = create_symlink(&plan, &lock.existing_links);
    drop(lock);

    match outcome {
        Ok(SymlinkOutcome::Created) => {
            if !plan.id_exists {
                warn_device(
                    ctx,
                    rt,
                    events::SYMLINKED_ON_DEVICE_NAME,
                    kernel_name,
                    format!("{kernel_name} has no by-id path, symlinking on the kernel name which may change across reboots"),
                )
                .await;
            }
            note_device(
                ctx,
                rt,
                events::FOUND_MATCHING_DISK,
                kernel_name,
                format!(
                    "{} linked at {}",
                    plan.source.display(),
                    plan.target.display()
                ),
            )
            .await;
        }
        Ok(SymlinkOutcome::AlreadyPresent) => {}
        Ok(SymlinkOutcome::LinkedElsewhere(links)) => {
            warn_device(
                ctx,
                rt,
                events::DEVICE_SYMLINK_EXISTS,
                kernel_name,
                format!("{kernel_name} is already linked at {links:?}"),
            )
            .await;
            return ClaimOutcome::LinkedElsewhere;
        }
        Err(e) => {
            warn_device(
                ctx,
                rt,
                events::ERROR_CREATING_SYMLINK,
                kernel_name,
                format!("failed to link {}: {e}", plan.target.display()),
            )
            .await;
            return ClaimOutcome::Failed;
        }
    }

    let device_id = if plan.id_exists {
        plan.source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    } else {
        None
    };
    ClaimOutcome::Linked(
        publish(
            ctx,
            rt,
            target,
            kernel_name,
            &plan.target,
            device_id.as_deref(),
            pacing,
        )
        .await,
    )
}

async fn publish(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    target: &ClassTarget<'_>,
    kernel_name: &str,
    link: &Path,
    device_id: Option<&str>,
    pacing: &mut CyclePacing,
) -> Option<PvOutcome> {
    let request = LocalPvRequest {
        symlink_path: link,
        storage_class: target.storage_class,
        mount_config: target.mount_config,
        device_name: kernel_name,
        device_id,
    };

    match create_or_update_pv(ctx, rt, &request).await {
        Ok(outcome) => Some(outcome),
        Err(e) if e.is_transient() => {
            debug!(device = kernel_name, "transient failure publishing PV: {e}");
            pacing.retry_soon = true;
            None
        }
        Err(e) => {
            warn_device(
                ctx,
                rt,
                events::ERROR_PROVISIONING_DEVICE,
                kernel_name,
                format!(
                    "failed to publish {} for class {}: {e}",
                    link.display(),
                    target.storage_class_name
                ),
            )
            .await;
            None
        }
    }
}
