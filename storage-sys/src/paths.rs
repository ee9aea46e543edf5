// SPDX-License-Identifier: GPL-3.0-only

//! Host directory layout consulted by the identity and symlink layers

use std::path::{Path, PathBuf};

/// Default per-node symlink root.
pub const DEFAULT_SYMLINK_ROOT: &str = "/mnt/local-storage";

/// Host locations of device nodes, stable ids, sysfs and mount tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub dev_dir: PathBuf,
    pub by_id_dir: PathBuf,
    pub sys_block_dir: PathBuf,

    /// Mount table of the host init process, used for bind-mount detection
    pub host_mountinfo: PathBuf,

    /// Mount table of this process, used for mountpoint probes
    pub self_mountinfo: PathBuf,

    /// Accept regular files where device nodes are expected
    pub allow_regular_device_files: bool,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            by_id_dir: PathBuf::from("/dev/disk/by-id"),
            sys_block_dir: PathBuf::from("/sys/block"),
            host_mountinfo: PathBuf::from("/proc/1/mountinfo"),
            self_mountinfo: PathBuf::from("/proc/self/mountinfo"),
            allow_regular_device_files: false,
        }
    }
}

impl HostPaths {
    /// Layout rooted under `root`, with device nodes modelled as regular files.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            dev_dir: root.join("dev"),
            by_id_dir: root.join("dev/disk/by-id"),
            sys_block_dir: root.join("sys/block"),
            host_mountinfo: root.join("proc/1/mountinfo"),
            self_mountinfo: root.join("proc/self/mountinfo"),
            allow_regular_device_files: true,
        }
    }

    pub fn device_node(&self, kernel_name: &str) -> PathBuf {
        self.dev_dir.join(kernel_name)
    }

    pub fn is_by_id_path(&self, path: &Path) -> bool {
        path.starts_with(&self.by_id_dir)
    }
}
