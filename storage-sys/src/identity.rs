// SPDX-License-Identifier: GPL-3.0-only

//! Stable device identity: by-id lookup and user path resolution

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::paths::HostPaths;
use crate::{Result, SysError};

/// A user-declared device path resolved to its kernel device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub kernel_name: String,

    /// Stable path under the by-id directory, when one is known
    pub path_by_id: Option<PathBuf>,
}

/// Find the by-id entry for `kernel_name`.
///
/// `preferred` (typically the source of an existing symlink) wins when it is a
/// by-id path still resolving to the device; otherwise the lexicographically
/// first matching entry is returned.
pub fn path_by_id(
    paths: &HostPaths,
    kernel_name: &str,
    preferred: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let device = match fs::canonicalize(paths.device_node(kernel_name)) {
        Ok(device) => device,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if let Some(preferred) = preferred {
        if paths.is_by_id_path(preferred) && resolves_to(preferred, &device) {
            return Ok(Some(preferred.to_path_buf()));
        }
    }

    let entries = match fs::read_dir(&paths.by_id_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if resolves_to(&path, &device) {
            candidates.push(path);
        }
    }
    candidates.sort();

    debug!(kernel_name, candidates = candidates.len(), "by-id lookup");
    Ok(candidates.into_iter().next())
}

/// Whether `link` evaluates (through symlinks) to the canonical `device`.
pub fn resolves_to(link: &Path, device: &Path) -> bool {
    fs::canonicalize(link).is_ok_and(|resolved| resolved == device)
}

/// Resolve a user-declared path (`/dev/sdb`, `/dev/disk/by-id/...`, or any
/// symlink to a device node) to its kernel name.
///
/// Unresolvable paths, directories, regular files and non-block special files
/// are rejected.
pub fn resolve_device_path(paths: &HostPaths, user_path: &Path) -> Result<ResolvedDevice> {
    let invalid = |reason: &str| SysError::InvalidDevicePath {
        path: user_path.to_path_buf(),
        reason: reason.to_string(),
    };

    let resolved = fs::canonicalize(user_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => invalid("path does not resolve to an existing file"),
        _ => SysError::Io(e),
    })?;

    let file_type = fs::metadata(&resolved)?.file_type();
    if file_type.is_dir() {
        return Err(invalid("path is a directory"));
    }
    if file_type.is_file() && !paths.allow_regular_device_files {
        return Err(invalid("path is a regular file"));
    }
    if !file_type.is_file() && !file_type.is_block_device() {
        return Err(invalid("path is not a block device"));
    }

    let kernel_name = resolved
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| invalid("path has no file name"))?;

    let path_by_id = if paths.is_by_id_path(user_path) {
        Some(user_path.to_path_buf())
    } else {
        None
    };

    Ok(ResolvedDevice {
        kernel_name,
        path_by_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn fixture() -> (tempfile::TempDir, HostPaths) {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::rooted_at(root.path());
        fs::create_dir_all(&paths.by_id_dir).unwrap();
        fs::write(paths.device_node("sdb"), b"").unwrap();
        fs::write(paths.device_node("sdc"), b"").unwrap();
        symlink("../../sdb", paths.by_id_dir.join("wwn-0x5000")).unwrap();
        symlink("../../sdb", paths.by_id_dir.join("ata-DISK_1")).unwrap();
        (root, paths)
    }

    #[test]
    fn picks_first_by_id_entry_or_preferred() {
        let (_root, paths) = fixture();
        let found = path_by_id(&paths, "sdb", None).unwrap();
        assert_eq!(found, Some(paths.by_id_dir.join("ata-DISK_1")));

        let preferred = paths.by_id_dir.join("wwn-0x5000");
        let found = path_by_id(&paths, "sdb", Some(&preferred)).unwrap();
        assert_eq!(found, Some(preferred));

        assert_eq!(path_by_id(&paths, "sdc", None).unwrap(), None);
        assert_eq!(path_by_id(&paths, "sdq", None).unwrap(), None);
    }

    #[test]
    fn stale_preferred_path_falls_back_to_scan() {
        let (_root, paths) = fixture();
        let moved = paths.by_id_dir.join("scsi-MOVED");
        symlink("../../sdc", &moved).unwrap();

        let found = path_by_id(&paths, "sdb", Some(&moved)).unwrap();
        assert_eq!(found, Some(paths.by_id_dir.join("ata-DISK_1")));

        // Only by-id entries are honored.
        let found = path_by_id(&paths, "sdb", Some(&paths.device_node("sdb"))).unwrap();
        assert_eq!(found, Some(paths.by_id_dir.join("ata-DISK_1")));
    }

    #[test]
    fn resolves_kernel_and_by_id_paths() {
        let (_root, paths) = fixture();
        let by_id = paths.by_id_dir.join("wwn-0x5000");
        let resolved = resolve_device_path(&paths, &by_id).unwrap();
        assert_eq!(resolved.kernel_name, "sdb");
        assert_eq!(resolved.path_by_id, Some(by_id));

        let resolved = resolve_device_path(&paths, &paths.device_node("sdc")).unwrap();
        assert_eq!(resolved.kernel_name, "sdc");
        assert_eq!(resolved.path_by_id, None);
    }

    #[test]
    fn rejects_directories_and_missing_paths() {
        let (_root, paths) = fixture();
        assert!(matches!(
            resolve_device_path(&paths, &paths.by_id_dir),
            Err(SysError::InvalidDevicePath { .. })
        ));
        assert!(matches!(
            resolve_device_path(&paths, &paths.device_node("nope")),
            Err(SysError::InvalidDevicePath { .. })
        ));

        let strict = HostPaths {
            allow_regular_device_files: false,
            ..paths.clone()
        };
        assert!(matches!(
            resolve_device_path(&strict, &paths.device_node("sdb")),
            Err(SysError::InvalidDevicePath { .. })
        ));
    }
}
