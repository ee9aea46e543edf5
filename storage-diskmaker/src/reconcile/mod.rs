// SPDX-License-Identifier: GPL-3.0-only

//! Owner reconcilers
//!
//! Both owner kinds share one cycle: drain released PVs, clean up symlinks,
//! tear down if the owner is going away, otherwise enumerate, classify,
//! symlink and publish. Each step runs strictly after the previous one.

pub mod local_volume;
pub mod local_volume_set;
pub mod provision;
pub mod symlinks;
pub mod teardown;

use std::io;
use std::time::Duration;

use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;
use kube::api::ObjectMeta;
use storage_sys::mounts::{MountEntry, read_mountinfo};
use storage_sys::{HostPaths, SysError};
use storage_types::labels::{OWNER_FINALIZER, PROVISIONED_BY_ANNOTATION};
use storage_types::{DiskEvent, events};
use tracing::{debug, info, warn};

use crate::context::DaemonContext;
use crate::error::Result;
use crate::pv::with_timeout;
use crate::runtime::RuntimeConfig;

pub use local_volume::reconcile_local_volume;
pub use local_volume_set::reconcile_local_volume_set;

pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(60);
pub const FAST_REQUEUE: Duration = Duration::from_secs(5);

/// Floor for the shortened requeue while devices wait out their minimum age.
const MIN_DELAYED_REQUEUE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    After(Duration),
    AwaitChange,
}

/// Signals collected during one cycle that shorten the next requeue.
#[derive(Debug, Default, Clone, Copy)]
pub struct CyclePacing {
    /// At least one device is younger than the minimum age
    pub delayed_devices: bool,

    /// A transient API failure asked for a quick retry
    pub retry_soon: bool,
}

impl CyclePacing {
    pub fn requeue(&self, device_min_age: Duration) -> Requeue {
        let mut after = DEFAULT_REQUEUE;
        if self.delayed_devices {
            after = after.min((device_min_age / 2).max(MIN_DELAYED_REQUEUE));
        }
        if self.retry_soon {
            after = after.min(FAST_REQUEUE);
        }
        Requeue::After(after)
    }
}

/// Load every PV published by this node into the cache on the first cycle.
pub(crate) async fn ensure_cache_populated(ctx: &DaemonContext, rt: &RuntimeConfig) -> Result<()> {
    if ctx.cache.is_populated() {
        return Ok(());
    }
    let pvs = with_timeout("list PVs", ctx.api.list_persistent_volumes("")).await?;
    let own: Vec<_> = pvs
        .into_iter()
        .filter(|pv| {
            pv.annotations().get(PROVISIONED_BY_ANNOTATION).map(String::as_str)
                == Some(rt.provisioner_name.as_str())
        })
        .collect();
    info!(count = own.len(), "populated PV cache");
    ctx.cache.populate(own);
    Ok(())
}

/// Host mount table; a missing table reads as no mounts.
pub(crate) fn load_host_mounts(paths: &HostPaths) -> Result<Vec<MountEntry>> {
    match read_mountinfo(&paths.host_mountinfo) {
        Ok(entries) => Ok(entries),
        Err(SysError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %paths.host_mountinfo.display(), "no host mount table");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == OWNER_FINALIZER))
}

/// Returns whether the metadata changed.
pub(crate) fn add_finalizer(meta: &mut ObjectMeta) -> bool {
    if has_finalizer(meta) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(OWNER_FINALIZER.to_string());
    true
}

/// Returns whether the metadata changed.
pub(crate) fn remove_finalizer(meta: &mut ObjectMeta) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != OWNER_FINALIZER);
    before != finalizers.len()
}

/// Owner-wide warning, rate limited per owner and reason.
pub(crate) async fn warn_owner(ctx: &DaemonContext, rt: &RuntimeConfig, reason: &str, message: String) {
    warn!(owner = %rt.owner, reason, "{message}");
    let key = format!("{}/{reason}", rt.owner);
    let event = DiskEvent::warning(reason, message);
    ctx.owner_events.report(&key, &rt.regarding, &event).await;
}

/// Device warning, published once per (reason, device).
pub(crate) async fn warn_device(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    reason: &str,
    device: &str,
    message: String,
) {
    warn!(owner = %rt.owner, reason, device, "{message}");
    let event = DiskEvent::warning(reason, message).with_device(device);
    ctx.device_events.report(&rt.regarding, &event).await;
}

pub(crate) async fn note_device(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    reason: &str,
    device: &str,
    message: String,
) {
    info!(owner = %rt.owner, reason, device, "{message}");
    let event = DiskEvent::normal(reason, message).with_device(device);
    ctx.device_events.report(&rt.regarding, &event).await;
}

/// Fetch a storage class, reporting a missing one against the owner.
pub(crate) async fn storage_class(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    name: &str,
) -> Result<Option<StorageClass>> {
    let found = with_timeout("get storage class", ctx.api.get_storage_class(name)).await?;
    if found.is_none() {
        warn_device(
            ctx,
            rt,
            events::ERROR_PROVISIONING_DEVICE,
            name,
            format!("storage class {name} not found"),
        )
        .await;
    }
    Ok(found)
}
