// SPDX-License-Identifier: GPL-3.0-only

//! Class directory bookkeeping: existing links and orphan cleanup

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use storage_sys::symlink::{list_symlinks, remove_class_dir, remove_symlink};
use storage_sys::orphaned_symlinks;
use storage_types::events;
use tracing::{debug, info};

use crate::context::DaemonContext;
use crate::error::Result;
use crate::pv::pv_name;
use crate::runtime::RuntimeConfig;

use super::warn_device;

/// Kernel name to symlink for every link in `class_dir` that still resolves.
pub fn linked_devices(class_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut linked = BTreeMap::new();
    for link in list_symlinks(class_dir)? {
        let Ok(resolved) = fs::canonicalize(&link) else {
            continue;
        };
        if let Some(kernel_name) = resolved.file_name() {
            linked
                .entry(kernel_name.to_string_lossy().to_string())
                .or_insert(link);
        }
    }
    Ok(linked)
}

/// Count orphaned links in the class directory of `storage_class`.
///
/// Links are only removed while the owner is being deleted, signalled by
/// `live_pvs` carrying the names of the owner's remaining PVs. A link is
/// removed once no PV is published for it; the class directory goes with
/// its last link.
pub async fn cleanup_symlinks(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    storage_class: &str,
    valid_kernel_names: &HashSet<String>,
    live_pvs: Option<&HashSet<String>>,
) -> Result<usize> {
    let class_dir = ctx.settings.class_dir(storage_class);
    let orphans = orphaned_symlinks(&class_dir, valid_kernel_names)?;

    let Some(live_pvs) = live_pvs else {
        if !orphans.is_empty() {
            debug!(storage_class, orphans = orphans.len(), "keeping orphaned symlinks");
        }
        return Ok(orphans.len());
    };

    for link in list_symlinks(&class_dir)? {
        let base = link
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = pv_name(&base, &rt.node_name, storage_class);
        if live_pvs.contains(&name) || ctx.cleanup.in_progress(&name) {
            continue;
        }
        if let Err(e) = remove_symlink(&link) {
            warn_device(
                ctx,
                rt,
                events::ERROR_REMOVING_SYMLINK,
                &base,
                format!("failed to remove symlink {}: {e}", link.display()),
            )
            .await;
        }
    }

    if remove_class_dir(&class_dir)? {
        info!(storage_class, "removed empty class directory");
    }
    Ok(orphans.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn maps_links_to_kernel_names() {
        let root = tempfile::tempdir().expect("tempdir");
        let dev = root.path().join("dev");
        let class_dir = root.path().join("mnt/fast");
        fs::create_dir_all(&dev).unwrap();
        fs::create_dir_all(&class_dir).unwrap();
        fs::write(dev.join("sdb"), b"").unwrap();
        symlink(dev.join("sdb"), class_dir.join("wwn-0x1")).unwrap();
        symlink(dev.join("gone"), class_dir.join("gone")).unwrap();

        let linked = linked_devices(&class_dir).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked.get("sdb"), Some(&class_dir.join("wwn-0x1")));
        assert!(linked_devices(&root.path().join("missing")).unwrap().is_empty());
    }
}
