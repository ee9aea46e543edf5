// SPDX-License-Identifier: GPL-3.0-only

//! Volume type and capacity probes for symlink targets

use std::fs::{self, File};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use nix::sys::statvfs::statvfs;
use storage_types::VolumeMode;

use crate::{Result, SysError};

// BLKGETSIZE64 = _IOR(0x12, 114, size_t)
nix::ioctl_read!(blk_get_size64, 0x12, 114, u64);

/// Volume mode of the file a symlink target evaluates to.
pub fn path_volume_mode(path: &Path) -> Result<VolumeMode> {
    let file_type = fs::metadata(path)?.file_type();
    if file_type.is_block_device() {
        Ok(VolumeMode::Block)
    } else if file_type.is_dir() {
        Ok(VolumeMode::Filesystem)
    } else {
        Err(SysError::UnsupportedVolumeType {
            path: path.to_path_buf(),
        })
    }
}

/// Byte capacity of a block device.
pub fn block_capacity(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let mut size: u64 = 0;
    // SAFETY: the fd is valid for the lifetime of `file` and `size` is a
    // properly aligned u64 the kernel writes into.
    unsafe { blk_get_size64(file.as_raw_fd(), &mut size) }.map_err(|source| SysError::Ioctl {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(size)
}

/// Total byte capacity of the filesystem mounted at `path`.
pub fn filesystem_capacity(path: &Path) -> Result<u64> {
    let stats = statvfs(path).map_err(|errno| SysError::Io(errno.into()))?;
    Ok(stats.blocks() as u64 * stats.fragment_size() as u64)
}
