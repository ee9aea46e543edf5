// SPDX-License-Identifier: GPL-3.0-only

//! Block device models
//!
//! A `BlockDevice` is rebuilt from `lsblk` output on every reconcile and has
//! no identity beyond its kernel name for the lifetime of one attachment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TypesError;

/// Device state reported by lsblk for a suspended device-mapper target.
pub const STATE_SUSPENDED: &str = "suspended";

/// Device type column as reported by lsblk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Disk,
    Part,
    Loop,
    Lvm,
    Crypt,
    Mpath,
    Raid,
    Other(String),
}

impl DeviceType {
    /// Parse an lsblk `TYPE` value. Matching is case-insensitive; raid levels
    /// (`raid0`, `raid1`, ...) all fold into `Raid`.
    pub fn parse(value: &str) -> Self {
        let lower = value.trim().to_ascii_lowercase();
        match lower.as_str() {
            "disk" => Self::Disk,
            "part" => Self::Part,
            "loop" => Self::Loop,
            "lvm" => Self::Lvm,
            "crypt" => Self::Crypt,
            "mpath" => Self::Mpath,
            raid if raid.starts_with("raid") => Self::Raid,
            _ => Self::Other(lower),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Disk => "disk",
            Self::Part => "part",
            Self::Loop => "loop",
            Self::Lvm => "lvm",
            Self::Crypt => "crypt",
            Self::Mpath => "mpath",
            Self::Raid => "raid",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret an lsblk boolean column.
///
/// `"0"` and `"1"` map to `Some(false)` and `Some(true)`, an empty column to
/// `None`; any other value is rejected.
pub fn parse_tri_state(column: &str, value: &str) -> Result<Option<bool>, TypesError> {
    match value.trim() {
        "0" => Ok(Some(false)),
        "1" => Ok(Some(true)),
        "" => Ok(None),
        other => Err(TypesError::InvalidTriState {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Normalized block device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    /// Kernel name, unique per node (e.g. "sdb")
    pub kernel_name: String,

    /// Path-style name from the NAME column
    pub name: String,

    pub device_type: DeviceType,

    /// Size in bytes
    pub size_bytes: u64,

    pub model: String,
    pub vendor: String,
    pub serial: String,
    pub partition_label: String,

    /// Raw ROTA column
    pub rotational: String,

    /// Raw RO column
    pub read_only: String,

    /// Raw RM column
    pub removable: String,

    /// running, live, suspended or empty
    pub state: String,

    /// Filesystem signature detected by blkid; empty when none
    pub fs_type: String,

    /// Cached stable identifier under /dev/disk/by-id, empty when unknown
    pub path_by_id: String,
}

impl BlockDevice {
    /// Device node path under /dev.
    pub fn dev_path(&self) -> String {
        format!("/dev/{}", self.kernel_name)
    }

    pub fn is_rotational(&self) -> Result<Option<bool>, TypesError> {
        parse_tri_state("ROTA", &self.rotational)
    }

    pub fn is_read_only(&self) -> Result<Option<bool>, TypesError> {
        parse_tri_state("RO", &self.read_only)
    }

    pub fn is_removable(&self) -> Result<Option<bool>, TypesError> {
        parse_tri_state("RM", &self.removable)
    }

    pub fn is_suspended(&self) -> bool {
        self.state.eq_ignore_ascii_case(STATE_SUSPENDED)
    }

    pub fn has_fs_signature(&self) -> bool {
        !self.fs_type.trim().is_empty()
    }
}

impl Default for BlockDevice {
    fn default() -> Self {
        Self {
            kernel_name: String::new(),
            name: String::new(),
            device_type: DeviceType::Disk,
            size_bytes: 0,
            model: String::new(),
            vendor: String::new(),
            serial: String::new(),
            partition_label: String::new(),
            rotational: String::new(),
            read_only: String::new(),
            removable: String::new(),
            state: String::new(),
            fs_type: String::new(),
            path_by_id: String::new(),
        }
    }
}
