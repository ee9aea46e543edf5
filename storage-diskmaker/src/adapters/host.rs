// SPDX-License-Identifier: GPL-3.0-only

//! Host seams backed by `storage-sys`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use storage_contracts::{
    DeviceLister, DeviceListing, DeviceWiper, StorageError, StorageErrorKind, VolumeUtil,
};
use storage_sys::{SysError, capacity, list_block_devices, mounts, wipefs};
use storage_types::VolumeMode;

fn map_sys_error(operation: &str, err: SysError) -> StorageError {
    let kind = match &err {
        SysError::DeviceBusy(_) => StorageErrorKind::Busy,
        SysError::ToolNotFound(_) => StorageErrorKind::Unsupported,
        SysError::UnsupportedVolumeType { .. } => StorageErrorKind::Unsupported,
        SysError::InvalidDevicePath { .. } => StorageErrorKind::InvalidInput,
        SysError::NotMounted(_) => StorageErrorKind::NotFound,
        SysError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
        SysError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            StorageErrorKind::PermissionDenied
        }
        _ => StorageErrorKind::Internal,
    };
    StorageError::new(kind, format!("{operation}: {err}"))
}

async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> storage_sys::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::new(StorageErrorKind::Internal, format!("{operation}: {e}")))?
        .map_err(|e| map_sys_error(operation, e))
}

/// Enumerates devices with `lsblk` and `blkid`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysDeviceLister;

#[async_trait]
impl DeviceLister for SysDeviceLister {
    async fn list_devices(&self, paths: &[String]) -> Result<DeviceListing, StorageError> {
        let paths = paths.to_vec();
        let outcome = blocking("list block devices", move || list_block_devices(&paths)).await?;
        Ok(DeviceListing {
            devices: outcome.devices,
            bad_rows: outcome.bad_rows,
        })
    }
}

/// Clears signatures with `wipefs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysDeviceWiper;

#[async_trait]
impl DeviceWiper for SysDeviceWiper {
    async fn wipe(&self, path: &Path) -> Result<(), StorageError> {
        let path = path.to_path_buf();
        blocking("wipe device", move || wipefs::wipe_device(&path)).await
    }
}

/// Capacity and mount probes against the local mount table.
#[derive(Debug, Clone)]
pub struct SysVolumeUtil {
    mountinfo: PathBuf,
}

impl SysVolumeUtil {
    pub fn new(mountinfo: impl Into<PathBuf>) -> Self {
        Self {
            mountinfo: mountinfo.into(),
        }
    }
}

impl VolumeUtil for SysVolumeUtil {
    fn volume_mode(&self, path: &Path) -> Result<VolumeMode, StorageError> {
        capacity::path_volume_mode(path).map_err(|e| map_sys_error("probe volume mode", e))
    }

    fn block_capacity(&self, path: &Path) -> Result<u64, StorageError> {
        capacity::block_capacity(path).map_err(|e| map_sys_error("block capacity", e))
    }

    fn filesystem_capacity(&self, path: &Path) -> Result<u64, StorageError> {
        capacity::filesystem_capacity(path).map_err(|e| map_sys_error("filesystem capacity", e))
    }

    fn is_mount_point(&self, path: &Path) -> Result<bool, StorageError> {
        mounts::is_mount_point(&self.mountinfo, path).map_err(|e| map_sys_error("probe mountpoint", e))
    }
}
