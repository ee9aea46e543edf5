// SPDX-License-Identifier: GPL-3.0-only

//! Symlink planning, materialization and orphan detection under the
//! per-class discovery directories.

use std::collections::HashSet;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{symlink, DirBuilderExt};
use std::path::{Path, PathBuf};

use storage_types::BlockDevice;
use tracing::{debug, info, warn};

use crate::identity::resolves_to;
use crate::paths::HostPaths;
use crate::{Result, SysError};

const CLASS_DIR_MODE: u32 = 0o755;

/// Source and target of the symlink for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkPlan {
    /// Path the link points at: by-id path or `/dev/<kname>`
    pub source: PathBuf,

    /// Link location: `<class_dir>/<base(source)>`
    pub target: PathBuf,

    /// False when falling back to the kernel name
    pub id_exists: bool,
}

/// Choose source and target for `device` under `class_dir`.
///
/// The by-id path is used only when it lives under the by-id directory and
/// still resolves to the device's kernel node.
pub fn plan_symlink(paths: &HostPaths, device: &BlockDevice, class_dir: &Path) -> SymlinkPlan {
    let dev_node = paths.device_node(&device.kernel_name);

    if !device.path_by_id.is_empty() {
        let by_id = PathBuf::from(&device.path_by_id);
        let resolves = fs::canonicalize(&dev_node).is_ok_and(|node| resolves_to(&by_id, &node));
        if paths.is_by_id_path(&by_id) && resolves {
            if let Some(base) = by_id.file_name() {
                return SymlinkPlan {
                    target: class_dir.join(base),
                    source: by_id,
                    id_exists: true,
                };
            }
        }
    }

    SymlinkPlan {
        target: class_dir.join(&device.kernel_name),
        source: dev_node,
        id_exists: false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymlinkOutcome {
    Created,

    /// The intended symlink already exists (idempotent re-run)
    AlreadyPresent,

    /// The device is linked elsewhere, typically under another class
    LinkedElsewhere(Vec<PathBuf>),
}

/// Materialize `plan`, given the links already found resolving to the device.
pub fn create_symlink(plan: &SymlinkPlan, existing_links: &[PathBuf]) -> Result<SymlinkOutcome> {
    if existing_links.iter().any(|link| link == &plan.target) {
        return Ok(SymlinkOutcome::AlreadyPresent);
    }
    if !existing_links.is_empty() {
        warn!(
            source = %plan.source.display(),
            existing = ?existing_links,
            "device already symlinked elsewhere"
        );
        return Ok(SymlinkOutcome::LinkedElsewhere(existing_links.to_vec()));
    }

    if let Some(class_dir) = plan.target.parent() {
        DirBuilder::new()
            .recursive(true)
            .mode(CLASS_DIR_MODE)
            .create(class_dir)?;
    }

    match symlink(&plan.source, &plan.target) {
        Ok(()) => {
            info!(
                source = %plan.source.display(),
                target = %plan.target.display(),
                "created symlink"
            );
            Ok(SymlinkOutcome::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // Lost a race: accept only if it points at the same device.
            let source = fs::canonicalize(&plan.source)?;
            if resolves_to(&plan.target, &source) {
                debug!(target = %plan.target.display(), "symlink appeared concurrently");
                Ok(SymlinkOutcome::AlreadyPresent)
            } else {
                let existing = fs::read_link(&plan.target).unwrap_or_else(|_| plan.target.clone());
                Err(SysError::SymlinkConflict {
                    target: plan.target.clone(),
                    existing,
                })
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Entries of `class_dir` whose resolved target is not one of the kernel
/// names in `valid_kernel_names`. Dangling links are orphans too.
pub fn orphaned_symlinks(class_dir: &Path, valid_kernel_names: &HashSet<String>) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut orphans = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let kernel_name = fs::canonicalize(&path)
            .ok()
            .and_then(|resolved| resolved.file_name().map(|n| n.to_string_lossy().to_string()));
        match kernel_name {
            Some(name) if valid_kernel_names.contains(&name) => {}
            _ => orphans.push(path),
        }
    }
    orphans.sort();
    Ok(orphans)
}

/// Symlinks currently present in `class_dir`.
pub fn list_symlinks(class_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut links = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_symlink() {
            links.push(entry.path());
        }
    }
    links.sort();
    Ok(links)
}

/// Remove a symlink. Anything that is not a symlink is left alone.
pub fn remove_symlink(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            fs::remove_file(path)?;
            info!(path = %path.display(), "removed symlink");
            Ok(true)
        }
        Ok(_) => {
            warn!(path = %path.display(), "refusing to remove non-symlink");
            Ok(false)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove a class directory once it holds no entries.
pub fn remove_class_dir(class_dir: &Path) -> Result<bool> {
    match fs::remove_dir(class_dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, HostPaths, PathBuf) {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::rooted_at(root.path());
        fs::create_dir_all(&paths.by_id_dir).unwrap();
        fs::write(paths.device_node("sdb"), b"").unwrap();
        fs::write(paths.device_node("sdc"), b"").unwrap();
        symlink(paths.device_node("sdb"), paths.by_id_dir.join("wwn-0x1")).unwrap();
        let class_dir = root.path().join("mnt/local-storage/fast");
        (root, paths, class_dir)
    }

    fn device(kernel_name: &str, path_by_id: &str) -> BlockDevice {
        BlockDevice {
            kernel_name: kernel_name.to_string(),
            path_by_id: path_by_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn plans_by_id_or_kernel_name() {
        let (_root, paths, class_dir) = fixture();
        let by_id = paths.by_id_dir.join("wwn-0x1");

        let plan = plan_symlink(&paths, &device("sdb", &by_id.to_string_lossy()), &class_dir);
        assert!(plan.id_exists);
        assert_eq!(plan.source, by_id);
        assert_eq!(plan.target, class_dir.join("wwn-0x1"));

        // by-id path that resolves to another device is ignored
        let plan = plan_symlink(&paths, &device("sdc", &by_id.to_string_lossy()), &class_dir);
        assert!(!plan.id_exists);
        assert_eq!(plan.source, paths.device_node("sdc"));
        assert_eq!(plan.target, class_dir.join("sdc"));
    }

    #[test]
    fn creates_links_idempotently() {
        let (_root, paths, class_dir) = fixture();
        let plan = plan_symlink(&paths, &device("sdc", ""), &class_dir);

        assert_eq!(create_symlink(&plan, &[]).unwrap(), SymlinkOutcome::Created);
        assert_eq!(
            create_symlink(&plan, &[plan.target.clone()]).unwrap(),
            SymlinkOutcome::AlreadyPresent
        );
        // link exists but the caller did not know: re-evaluated as same device
        assert_eq!(create_symlink(&plan, &[]).unwrap(), SymlinkOutcome::AlreadyPresent);

        let elsewhere = PathBuf::from("/mnt/local-storage/slow/sdc");
        assert_eq!(
            create_symlink(&plan, &[elsewhere.clone()]).unwrap(),
            SymlinkOutcome::LinkedElsewhere(vec![elsewhere])
        );
    }

    #[test]
    fn conflicting_target_is_an_error() {
        let (_root, paths, class_dir) = fixture();
        fs::create_dir_all(&class_dir).unwrap();
        symlink(paths.device_node("sdb"), class_dir.join("sdc")).unwrap();

        let plan = plan_symlink(&paths, &device("sdc", ""), &class_dir);
        assert!(matches!(
            create_symlink(&plan, &[]),
            Err(SysError::SymlinkConflict { .. })
        ));
    }

    #[test]
    fn finds_orphans_and_removes_links() {
        let (_root, paths, class_dir) = fixture();
        fs::create_dir_all(&class_dir).unwrap();
        symlink(paths.device_node("sdb"), class_dir.join("sdb")).unwrap();
        symlink(paths.device_node("sdc"), class_dir.join("sdc")).unwrap();
        symlink(paths.device_node("sdx"), class_dir.join("sdx")).unwrap();

        let valid = HashSet::from(["sdb".to_string()]);
        let orphans = orphaned_symlinks(&class_dir, &valid).unwrap();
        assert_eq!(orphans, vec![class_dir.join("sdc"), class_dir.join("sdx")]);

        for orphan in &orphans {
            assert!(remove_symlink(orphan).unwrap());
        }
        assert_eq!(list_symlinks(&class_dir).unwrap(), vec![class_dir.join("sdb")]);
        assert!(!remove_class_dir(&class_dir).unwrap());
        assert!(!remove_symlink(&paths.device_node("sdb")).unwrap());
    }
}
