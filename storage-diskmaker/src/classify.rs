// SPDX-License-Identifier: GPL-3.0-only

//! Device classification
//!
//! Filters look only at the device and the host; matchers evaluate a
//! `DeviceInclusionSpec`. Both are named tables evaluated in order, stopping
//! at the first rule that rejects or fails.

use std::fmt;

use storage_sys::HostPaths;
use storage_sys::mounts::{MountEntry, bind_mount_of};
use storage_sys::{sysfs, try_exclusive_open};
use storage_types::{BlockDevice, DeviceInclusionSpec, DeviceMechanicalProperty};

use crate::error::Result;

/// Host state consulted by the filters.
pub struct HostProbe<'a> {
    pub paths: &'a HostPaths,

    /// Mount table of the host init process
    pub mounts: &'a [MountEntry],
}

pub type FilterFn = fn(&BlockDevice, &HostProbe<'_>) -> Result<bool>;
pub type MatcherFn = fn(&BlockDevice, &DeviceInclusionSpec) -> Result<bool>;

pub const NOT_READ_ONLY: &str = "notReadOnly";
pub const NOT_REMOVABLE: &str = "notRemovable";
pub const NOT_SUSPENDED: &str = "notSuspended";
pub const NO_FILESYSTEM_SIGNATURE: &str = "noFilesystemSignature";
pub const NO_CHILDREN: &str = "noChildren";
pub const NO_BIND_MOUNTS: &str = "noBindMounts";
pub const CAN_OPEN_EXCLUSIVELY: &str = "canOpenExclusively";

pub const IN_SIZE_RANGE: &str = "inSizeRange";
pub const IN_TYPE_LIST: &str = "inTypeList";
pub const IN_MECHANICAL_PROPERTY_LIST: &str = "inMechanicalPropertyList";
pub const IN_VENDOR_LIST: &str = "inVendorList";
pub const IN_MODEL_LIST: &str = "inModelList";

/// Ordered cheapest first; the exclusive open goes last.
pub static FILTERS: &[(&str, FilterFn)] = &[
    (NOT_READ_ONLY, not_read_only),
    (NOT_REMOVABLE, not_removable),
    (NOT_SUSPENDED, not_suspended),
    (NO_FILESYSTEM_SIGNATURE, no_filesystem_signature),
    (NO_CHILDREN, no_children),
    (NO_BIND_MOUNTS, no_bind_mounts),
    (CAN_OPEN_EXCLUSIVELY, can_open_exclusively),
];

pub static MATCHERS: &[(&str, MatcherFn)] = &[
    (IN_SIZE_RANGE, in_size_range),
    (IN_TYPE_LIST, in_type_list),
    (IN_MECHANICAL_PROPERTY_LIST, in_mechanical_property_list),
    (IN_VENDOR_LIST, in_vendor_list),
    (IN_MODEL_LIST, in_model_list),
];

#[derive(Debug)]
pub enum Verdict {
    Accepted,
    Rejected { rule: &'static str },
    Failed { rule: &'static str, message: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => f.write_str("accepted"),
            Self::Rejected { rule } => write!(f, "rejected by {rule}"),
            Self::Failed { rule, message } => write!(f, "{rule} failed: {message}"),
        }
    }
}

pub fn apply_filters(device: &BlockDevice, probe: &HostProbe<'_>) -> Verdict {
    apply_filters_except(device, probe, &[])
}

/// Like `apply_filters`, skipping the named rules.
pub fn apply_filters_except(device: &BlockDevice, probe: &HostProbe<'_>, skip: &[&str]) -> Verdict {
    for &(rule, filter) in FILTERS {
        if skip.contains(&rule) {
            continue;
        }
        match filter(device, probe) {
            Ok(true) => {}
            Ok(false) => return Verdict::Rejected { rule },
            Err(e) => {
                return Verdict::Failed {
                    rule,
                    message: e.to_string(),
                };
            }
        }
    }
    Verdict::Accepted
}

pub fn apply_matchers(device: &BlockDevice, spec: &DeviceInclusionSpec) -> Verdict {
    for &(rule, matcher) in MATCHERS {
        match matcher(device, spec) {
            Ok(true) => {}
            Ok(false) => return Verdict::Rejected { rule },
            Err(e) => {
                return Verdict::Failed {
                    rule,
                    message: e.to_string(),
                };
            }
        }
    }
    Verdict::Accepted
}

// An empty RO/RM column counts as false.
fn not_read_only(device: &BlockDevice, _: &HostProbe<'_>) -> Result<bool> {
    Ok(!device.is_read_only()?.unwrap_or(false))
}

fn not_removable(device: &BlockDevice, _: &HostProbe<'_>) -> Result<bool> {
    Ok(!device.is_removable()?.unwrap_or(false))
}

fn not_suspended(device: &BlockDevice, _: &HostProbe<'_>) -> Result<bool> {
    Ok(!device.is_suspended())
}

fn no_filesystem_signature(device: &BlockDevice, _: &HostProbe<'_>) -> Result<bool> {
    Ok(!device.has_fs_signature())
}

fn no_children(device: &BlockDevice, probe: &HostProbe<'_>) -> Result<bool> {
    Ok(!sysfs::has_children(&probe.paths.sys_block_dir, &device.kernel_name)?)
}

fn no_bind_mounts(device: &BlockDevice, probe: &HostProbe<'_>) -> Result<bool> {
    Ok(bind_mount_of(probe.mounts, &device.kernel_name).is_none())
}

fn can_open_exclusively(device: &BlockDevice, probe: &HostProbe<'_>) -> Result<bool> {
    let lock = try_exclusive_open(&probe.paths.device_node(&device.kernel_name))?;
    Ok(lock.is_some())
}

fn in_size_range(device: &BlockDevice, spec: &DeviceInclusionSpec) -> Result<bool> {
    if let Some(min) = spec.min_size_bytes()? {
        if device.size_bytes < min {
            return Ok(false);
        }
    }
    if let Some(max) = spec.max_size_bytes()? {
        if device.size_bytes > max {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_type_list(device: &BlockDevice, spec: &DeviceInclusionSpec) -> Result<bool> {
    Ok(spec.accepted_types().contains(&device.device_type))
}

fn in_mechanical_property_list(device: &BlockDevice, spec: &DeviceInclusionSpec) -> Result<bool> {
    let accepted = match spec.device_mechanical_properties.as_deref() {
        None | Some([]) => return Ok(true),
        Some(accepted) => accepted,
    };
    let property = match device.is_rotational()? {
        Some(true) => DeviceMechanicalProperty::Rotational,
        Some(false) => DeviceMechanicalProperty::NonRotational,
        None => return Ok(false),
    };
    Ok(accepted.contains(&property))
}

fn in_vendor_list(device: &BlockDevice, spec: &DeviceInclusionSpec) -> Result<bool> {
    Ok(contains_any(&device.vendor, spec.vendors.as_deref()))
}

fn in_model_list(device: &BlockDevice, spec: &DeviceInclusionSpec) -> Result<bool> {
    Ok(contains_any(&device.model, spec.models.as_deref()))
}

/// Case-insensitive substring whitelist; absent or empty accepts everything.
fn contains_any(value: &str, whitelist: Option<&[String]>) -> bool {
    let Some(whitelist) = whitelist.filter(|list| !list.is_empty()) else {
        return true;
    };
    let value = value.trim().to_lowercase();
    whitelist
        .iter()
        .any(|entry| value.contains(&entry.trim().to_lowercase()))
}
