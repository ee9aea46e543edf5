// SPDX-License-Identifier: GPL-3.0-only

//! Host fakes and a temp-dir host layout

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use storage_contracts::{
    DeviceLister, DeviceListing, DeviceWiper, StorageError, StorageErrorKind, VolumeUtil,
};
use storage_sys::HostPaths;
use storage_types::{BlockDevice, VolumeMode};
use tempfile::TempDir;

/// Host tree under a temp dir: `dev/`, `dev/disk/by-id/`, `sys/block/`,
/// `proc/1/mountinfo` and the symlink root `mnt/local-storage/`. Device
/// nodes are regular files.
pub struct HostFixture {
    root: TempDir,
    pub paths: HostPaths,
    pub symlink_root: PathBuf,
}

impl HostFixture {
    pub fn new() -> anyhow::Result<Self> {
        let root = tempfile::tempdir()?;
        let paths = HostPaths::rooted_at(root.path());
        fs::create_dir_all(&paths.by_id_dir)?;
        fs::create_dir_all(&paths.sys_block_dir)?;
        let symlink_root = root.path().join("mnt/local-storage");
        fs::create_dir_all(&symlink_root)?;
        Ok(Self {
            root,
            paths,
            symlink_root,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create the device node for `kernel_name` and return its path.
    pub fn add_device(&self, kernel_name: &str) -> anyhow::Result<PathBuf> {
        let node = self.paths.device_node(kernel_name);
        fs::write(&node, b"")?;
        fs::create_dir_all(self.paths.sys_block_dir.join(kernel_name))?;
        Ok(node)
    }

    /// Add a by-id link to an existing device node.
    pub fn add_by_id(&self, id: &str, kernel_name: &str) -> anyhow::Result<PathBuf> {
        let link = self.paths.by_id_dir.join(id);
        symlink(self.paths.device_node(kernel_name), &link)?;
        Ok(link)
    }

    /// Give `kernel_name` a partition child in sysfs.
    pub fn add_partition(&self, kernel_name: &str, partition: &str) -> anyhow::Result<()> {
        fs::create_dir_all(self.paths.sys_block_dir.join(kernel_name).join(partition))?;
        Ok(())
    }

    pub fn class_dir(&self, storage_class: &str) -> PathBuf {
        self.symlink_root.join(storage_class)
    }

    /// Base names of the links in a class directory, sorted.
    pub fn links(&self, storage_class: &str) -> Vec<String> {
        let mut links: Vec<String> = fs::read_dir(self.class_dir(storage_class))
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        links.sort();
        links
    }
}

/// Lister serving a configurable device table.
#[derive(Default)]
pub struct FakeDeviceLister {
    devices: Mutex<Vec<BlockDevice>>,
    failure: Mutex<Option<String>>,
}

impl FakeDeviceLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_devices(&self, devices: Vec<BlockDevice>) {
        *self.devices.lock().unwrap_or_else(PoisonError::into_inner) = devices;
    }

    /// Make every following listing fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }
}

#[async_trait]
impl DeviceLister for FakeDeviceLister {
    async fn list_devices(&self, paths: &[String]) -> Result<DeviceListing, StorageError> {
        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(StorageError::new(StorageErrorKind::Internal, message));
        }

        let wanted: HashSet<String> = paths
            .iter()
            .filter_map(|path| Path::new(path).file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect();
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|device| wanted.is_empty() || wanted.contains(&device.kernel_name))
            .cloned()
            .collect();
        Ok(DeviceListing {
            devices,
            bad_rows: Vec::new(),
        })
    }
}

/// Wiper that records what it was asked to wipe.
#[derive(Default)]
pub struct FakeWiper {
    wiped: Mutex<Vec<PathBuf>>,
    failure: Mutex<Option<String>>,
}

impl FakeWiper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following wipe fail with `message`. Failed attempts are
    /// still recorded.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn wiped(&self) -> Vec<PathBuf> {
        self.wiped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DeviceWiper for FakeWiper {
    async fn wipe(&self, path: &Path) -> Result<(), StorageError> {
        self.wiped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        match self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            Some(message) => Err(StorageError::new(StorageErrorKind::Internal, message)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Volume {
    mode: VolumeMode,
    bytes: u64,
    mounted: bool,
}

/// Volume probes answered per kernel name of the symlink target.
#[derive(Default)]
pub struct FakeVolumeUtil {
    volumes: Mutex<BTreeMap<String, Volume>>,
}

impl FakeVolumeUtil {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block(&self, kernel_name: &str, bytes: u64) {
        self.insert(kernel_name, VolumeMode::Block, bytes, false);
    }

    pub fn set_filesystem(&self, kernel_name: &str, bytes: u64, mounted: bool) {
        self.insert(kernel_name, VolumeMode::Filesystem, bytes, mounted);
    }

    fn insert(&self, kernel_name: &str, mode: VolumeMode, bytes: u64, mounted: bool) {
        self.volumes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kernel_name.to_string(), Volume { mode, bytes, mounted });
    }

    fn lookup(&self, path: &Path) -> Result<Volume, StorageError> {
        let kernel_name = fs::canonicalize(path)
            .ok()
            .and_then(|resolved| resolved.file_name().map(|n| n.to_string_lossy().to_string()))
            .ok_or_else(|| StorageError::not_found(format!("{} does not resolve", path.display())))?;
        self.volumes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kernel_name)
            .copied()
            .ok_or_else(|| StorageError::not_found(format!("no volume for {kernel_name}")))
    }
}

impl VolumeUtil for FakeVolumeUtil {
    fn volume_mode(&self, path: &Path) -> Result<VolumeMode, StorageError> {
        Ok(self.lookup(path)?.mode)
    }

    fn block_capacity(&self, path: &Path) -> Result<u64, StorageError> {
        Ok(self.lookup(path)?.bytes)
    }

    fn filesystem_capacity(&self, path: &Path) -> Result<u64, StorageError> {
        Ok(self.lookup(path)?.bytes)
    }

    fn is_mount_point(&self, path: &Path) -> Result<bool, StorageError> {
        Ok(self.lookup(path)?.mounted)
    }
}
