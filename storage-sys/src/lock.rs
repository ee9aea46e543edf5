// SPDX-License-Identifier: GPL-3.0-only

//! Cross-process exclusive device lock
//!
//! Opening a block device with `O_EXCL` fails with `EBUSY` while it is
//! mounted, held by device-mapper, or opened exclusively by another process.
//! The lock lives exactly as long as the returned handle.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Result, SysError};

/// Exclusive open handle on a device; released on drop.
#[derive(Debug)]
pub struct ExclusiveLock {
    path: PathBuf,
    _file: File,
}

impl ExclusiveLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        debug!(device = %self.path.display(), "released exclusive device lock");
    }
}

/// Try to open `device` read-only with `O_EXCL`. Returns `None` when busy.
pub fn try_exclusive_open(device: &Path) -> Result<Option<ExclusiveLock>> {
    match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_EXCL)
        .open(device)
    {
        Ok(file) => Ok(Some(ExclusiveLock {
            path: device.to_path_buf(),
            _file: file,
        })),
        Err(e) if e.raw_os_error() == Some(libc::EBUSY) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Symlinks under `roots` (searched two levels deep: `<root>/<class>/<link>`)
/// that evaluate to `device`.
pub fn find_symlinks_resolving_to(device: &Path, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let device = fs::canonicalize(device)?;
    let mut found = Vec::new();
    for root in roots {
        collect_links(root, &device, 2, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn collect_links(dir: &Path, device: &Path, depth: usize, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            if fs::canonicalize(&path).is_ok_and(|resolved| resolved == device) {
                found.push(path);
            }
        } else if file_type.is_dir() && depth > 1 {
            collect_links(&path, device, depth - 1, found)?;
        }
    }
    Ok(())
}

/// Outcome of `pv_creation_lock`.
#[derive(Debug)]
pub struct PvCreationLock {
    /// Held exclusive lock, if the device could be opened exclusively
    pub lock: Option<ExclusiveLock>,

    /// Existing symlinks under the searched roots resolving to the device
    pub existing_links: Vec<PathBuf>,
}

impl PvCreationLock {
    pub fn locked(&self) -> bool {
        self.lock.is_some()
    }

    /// A device may be claimed only when locked and not yet linked anywhere.
    pub fn safe_to_claim(&self) -> bool {
        self.locked() && self.existing_links.is_empty()
    }
}

/// Take the per-device lock guarding symlink creation and report existing
/// links. A busy device with no existing links is an error so the caller
/// retries on the next cycle.
pub fn pv_creation_lock(device: &Path, symlink_roots: &[PathBuf]) -> Result<PvCreationLock> {
    let lock = try_exclusive_open(device)?;
    let existing_links = find_symlinks_resolving_to(device, symlink_roots)?;

    if lock.is_none() && existing_links.is_empty() {
        return Err(SysError::DeviceBusy(device.to_path_buf()));
    }

    Ok(PvCreationLock {
        lock,
        existing_links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn finds_links_two_levels_deep() {
        let root = tempfile::tempdir().expect("tempdir");
        let dev = root.path().join("dev");
        let links = root.path().join("mnt");
        fs::create_dir_all(&dev).unwrap();
        fs::create_dir_all(links.join("fast")).unwrap();
        fs::create_dir_all(links.join("slow")).unwrap();
        fs::write(dev.join("sdb"), b"").unwrap();
        fs::write(dev.join("sdc"), b"").unwrap();
        symlink(dev.join("sdb"), links.join("fast/sdb")).unwrap();
        symlink(dev.join("sdc"), links.join("slow/sdc")).unwrap();
        symlink(dev.join("gone"), links.join("slow/gone")).unwrap();

        let found = find_symlinks_resolving_to(&dev.join("sdb"), &[links.clone()]).unwrap();
        assert_eq!(found, vec![links.join("fast/sdb")]);
    }

    #[test]
    fn lock_reports_existing_links() {
        let root = tempfile::tempdir().expect("tempdir");
        let device = root.path().join("sdb");
        let class_dir = root.path().join("links/fast");
        fs::create_dir_all(&class_dir).unwrap();
        fs::write(&device, b"").unwrap();

        let lock = pv_creation_lock(&device, &[root.path().join("links")]).unwrap();
        assert!(lock.safe_to_claim());
        drop(lock);

        symlink(&device, class_dir.join("sdb")).unwrap();
        let lock = pv_creation_lock(&device, &[root.path().join("links")]).unwrap();
        assert!(lock.locked());
        assert!(!lock.safe_to_claim());
        assert_eq!(lock.existing_links, vec![class_dir.join("sdb")]);
    }
}
