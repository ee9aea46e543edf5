// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use storage_types::{BlockDevice, VolumeMode};

use crate::StorageError;

/// One enumeration of the node's block devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceListing {
    pub devices: Vec<BlockDevice>,

    /// Rows of the listing tool that could not be parsed
    pub bad_rows: Vec<String>,
}

#[async_trait]
pub trait DeviceLister: Send + Sync {
    /// List every block device; `paths` narrows only the signature lookup.
    async fn list_devices(&self, paths: &[String]) -> Result<DeviceListing, StorageError>;
}

#[async_trait]
pub trait DeviceWiper: Send + Sync {
    /// Remove all signatures from the device at `path`.
    async fn wipe(&self, path: &Path) -> Result<(), StorageError>;
}

/// On-node view of symlink targets.
pub trait VolumeUtil: Send + Sync {
    fn volume_mode(&self, path: &Path) -> Result<VolumeMode, StorageError>;

    fn block_capacity(&self, path: &Path) -> Result<u64, StorageError>;

    fn filesystem_capacity(&self, path: &Path) -> Result<u64, StorageError>;

    fn is_mount_point(&self, path: &Path) -> Result<bool, StorageError>;
}
