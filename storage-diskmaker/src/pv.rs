// SPDX-License-Identifier: GPL-3.0-only

//! Persistent volume publishing for claimed symlinks

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    LocalVolumeSource, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    PersistentVolume, PersistentVolumeSpec, VolumeNodeAffinity,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::api::ObjectMeta;
use storage_contracts::StorageError;
use storage_types::labels::{
    DEVICE_ID_LABEL, DEVICE_NAME_LABEL, HOSTNAME_LABEL, PROVISIONED_BY_ANNOTATION, PV_NAME_PREFIX,
};
use storage_types::{DiskEvent, MountConfig, VolumeMode, bytes_to_quantity, events, round_down_capacity};
use tracing::{debug, info, warn};

use crate::context::DaemonContext;
use crate::error::{DiskmakerError, Result};
use crate::runtime::RuntimeConfig;

/// Deadline for every API server call.
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

pub const RECLAIM_DELETE: &str = "Delete";
pub const RECLAIM_RETAIN: &str = "Retain";

const ACCESS_MODE_RWO: &str = "ReadWriteOnce";
const MAX_LABEL_VALUE_LEN: usize = 63;

pub async fn with_timeout<T>(
    call: &str,
    request: impl Future<Output = std::result::Result<T, StorageError>>,
) -> Result<T> {
    match tokio::time::timeout(API_TIMEOUT, request).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DiskmakerError::Timeout(call.to_string())),
    }
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the concatenation of `parts`.
pub fn fnv1a32(parts: &[&[u8]]) -> u32 {
    parts
        .iter()
        .flat_map(|part| part.iter())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Deterministic PV name for a symlink. Must never change: existing PVs are
/// found again only through this name.
pub fn pv_name(symlink_base: &str, node_name: &str, storage_class: &str) -> String {
    let hash = fnv1a32(&[
        symlink_base.as_bytes(),
        node_name.as_bytes(),
        storage_class.as_bytes(),
    ]);
    format!("{PV_NAME_PREFIX}{hash:x}")
}

/// One symlink to publish.
#[derive(Debug, Clone)]
pub struct LocalPvRequest<'a> {
    /// Symlink as seen by this daemon
    pub symlink_path: &'a Path,
    pub storage_class: &'a StorageClass,
    pub mount_config: &'a MountConfig,

    /// Kernel name of the backing device
    pub device_name: &'a str,

    /// Base name of the by-id path, when the link uses one
    pub device_id: Option<&'a str>,
}

impl LocalPvRequest<'_> {
    pub fn symlink_base(&self) -> String {
        self.symlink_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Symlink location on the host, recorded as the PV local path.
    pub fn host_path(&self) -> PathBuf {
        Path::new(&self.mount_config.host_dir).join(self.symlink_base())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PvOutcome {
    Created(String),
    Updated(String),
    Unchanged(String),

    /// Cleanup for this name is still running; nothing was done
    CleanupPending(String),

    /// Existing PV is Block mode but the path is a filesystem
    ModeMismatch(String),
}

impl PvOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Created(name)
            | Self::Updated(name)
            | Self::Unchanged(name)
            | Self::CleanupPending(name)
            | Self::ModeMismatch(name) => name,
        }
    }
}

/// Capacity and observed mode of a symlink target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeCapacity {
    pub actual_mode: VolumeMode,
    pub bytes: u64,
}

/// Probe the target of `request.symlink_path` and return its rounded capacity.
pub async fn volume_capacity(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    request: &LocalPvRequest<'_>,
) -> Result<VolumeCapacity> {
    let path = request.symlink_path;
    let desired = request.mount_config.volume_mode;
    let actual = ctx.volume_util.volume_mode(path)?;

    let bytes = match actual {
        VolumeMode::Block => {
            let has_mount_options = request
                .storage_class
                .mount_options
                .as_ref()
                .is_some_and(|options| !options.is_empty());
            if desired == VolumeMode::Block && has_mount_options {
                let event = DiskEvent::warning(
                    events::MOUNT_OPTIONS_IGNORED,
                    format!(
                        "mount options of storage class {} are ignored for block volumes",
                        request.storage_class.name_any()
                    ),
                )
                .with_device(request.device_name);
                ctx.device_events.report(&rt.regarding, &event).await;
            }
            ctx.volume_util.block_capacity(path)?
        }
        VolumeMode::Filesystem => {
            if desired == VolumeMode::Block {
                return Err(DiskmakerError::BlockRequestedOnFilesystem {
                    class: request.storage_class.name_any(),
                    path: path.to_path_buf(),
                });
            }
            if !ctx.volume_util.is_mount_point(path)? {
                return Err(DiskmakerError::NotMounted(path.to_path_buf()));
            }
            ctx.volume_util.filesystem_capacity(path)?
        }
    };

    Ok(VolumeCapacity {
        actual_mode: actual,
        bytes: round_down_capacity(bytes),
    })
}

/// Create the PV for a symlink, or merge missing labels into an existing one.
pub async fn create_or_update_pv(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    request: &LocalPvRequest<'_>,
) -> Result<PvOutcome> {
    let name = pv_name(&request.symlink_base(), &rt.node_name, &request.storage_class.name_any());

    if ctx.cleanup.in_progress(&name) {
        debug!(pv = %name, "cleanup in progress, not publishing");
        return Ok(PvOutcome::CleanupPending(name));
    }
    ctx.cleanup.forget(&name);

    let capacity = volume_capacity(ctx, rt, request).await?;
    let desired = build_pv(ctx, rt, request, &name, capacity.bytes).await?;

    let Some(mut existing) = with_timeout("get PV", ctx.api.get_persistent_volume(&name)).await?
    else {
        let created = with_timeout("create PV", ctx.api.create_persistent_volume(&desired)).await?;
        info!(
            pv = %name,
            device = request.device_name,
            capacity = capacity.bytes,
            "created local PV"
        );
        ctx.cache.add_or_update(created);
        return Ok(PvOutcome::Created(name));
    };

    let existing_mode = existing
        .spec
        .as_ref()
        .and_then(|spec| spec.volume_mode.as_deref());
    if existing_mode == Some(VolumeMode::Block.as_str())
        && capacity.actual_mode == VolumeMode::Filesystem
    {
        let event = DiskEvent::warning(
            events::PV_MODE_MISMATCH,
            format!(
                "PV {name} is Block mode but {} is a filesystem",
                request.symlink_path.display()
            ),
        )
        .with_device(request.device_name);
        ctx.device_events.report(&rt.regarding, &event).await;
        return Ok(PvOutcome::ModeMismatch(name));
    }

    let labels = existing.metadata.labels.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (key, value) in desired.labels() {
        if !labels.contains_key(key) {
            labels.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    if !changed {
        return Ok(PvOutcome::Unchanged(name));
    }

    let updated = with_timeout("update PV", ctx.api.update_persistent_volume(&existing)).await?;
    info!(pv = %name, "added missing labels to PV");
    ctx.cache.add_or_update(updated);
    Ok(PvOutcome::Updated(name))
}

async fn build_pv(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    request: &LocalPvRequest<'_>,
    name: &str,
    capacity: u64,
) -> Result<PersistentVolume> {
    let hostname = rt
        .hostname()
        .ok_or_else(|| DiskmakerError::MissingHostnameLabel(rt.node_name.clone()))?
        .to_string();
    let class_name = request.storage_class.name_any();

    let reclaim_policy = match request.storage_class.reclaim_policy.clone() {
        Some(policy) => policy,
        None => {
            let event = DiskEvent::warning(
                events::MISSING_RECLAIM_POLICY,
                format!("storage class {class_name} has no reclaim policy, defaulting to Delete"),
            )
            .with_device(class_name.clone());
            ctx.device_events.report(&rt.regarding, &event).await;
            RECLAIM_DELETE.to_string()
        }
    };

    let mut labels = rt.owner.labels();
    labels.insert(HOSTNAME_LABEL.to_string(), hostname.clone());
    labels.insert(DEVICE_NAME_LABEL.to_string(), request.device_name.to_string());
    if let Some(device_id) = request.device_id {
        if is_valid_label_value(device_id) {
            labels.insert(DEVICE_ID_LABEL.to_string(), device_id.to_string());
        } else {
            warn!(device_id, "device id is not a valid label value, leaving it off");
        }
    }

    let volume_mode = request.mount_config.volume_mode;
    let mount_options = match volume_mode {
        VolumeMode::Filesystem => request.storage_class.mount_options.clone(),
        VolumeMode::Block => None,
    };

    Ok(PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            annotations: Some(BTreeMap::from([(
                PROVISIONED_BY_ANNOTATION.to_string(),
                rt.provisioner_name.clone(),
            )])),
            owner_references: Some(vec![node_owner_reference(rt)]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            capacity: Some(BTreeMap::from([(
                "storage".to_string(),
                Quantity(bytes_to_quantity(capacity)),
            )])),
            access_modes: Some(vec![ACCESS_MODE_RWO.to_string()]),
            persistent_volume_reclaim_policy: Some(reclaim_policy),
            storage_class_name: Some(class_name),
            volume_mode: Some(volume_mode.as_str().to_string()),
            mount_options,
            local: Some(LocalVolumeSource {
                path: request.host_path().to_string_lossy().to_string(),
                fs_type: request.mount_config.effective_fs_type(),
            }),
            node_affinity: Some(node_affinity(&hostname)),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn node_owner_reference(rt: &RuntimeConfig) -> OwnerReference {
    OwnerReference {
        api_version: "v1".to_string(),
        kind: "Node".to_string(),
        name: rt.node_name.clone(),
        uid: rt.node.uid().unwrap_or_default(),
        ..Default::default()
    }
}

/// Required affinity to the node carrying `hostname`.
pub fn node_affinity(hostname: &str) -> VolumeNodeAffinity {
    VolumeNodeAffinity {
        required: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: HOSTNAME_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![hostname.to_string()]),
                }]),
                match_fields: None,
            }],
        }),
    }
}

fn is_valid_label_value(value: &str) -> bool {
    value.len() <= MAX_LABEL_VALUE_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value.chars().next().is_none_or(|c| c.is_ascii_alphanumeric())
        && value.chars().last().is_none_or(|c| c.is_ascii_alphanumeric())
}
