// SPDX-License-Identifier: GPL-3.0-only

//! mountinfo parsing for mountpoint probes and bind-mount detection

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Result, SysError};

/// One line of `/proc/<pid>/mountinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Root of the mount within the source filesystem (field 4)
    pub root: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub source: String,
}

pub fn read_mountinfo(path: &Path) -> Result<Vec<MountEntry>> {
    let mount_info = fs::read_to_string(path)?;
    parse_mountinfo(&mount_info)
}

pub fn parse_mountinfo(input: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let (left, right) = line
            .split_once(" - ")
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;

        let left_fields: Vec<&str> = left.split_whitespace().collect();
        let (Some(root), Some(mount_point)) = (left_fields.get(3), left_fields.get(4)) else {
            return Err(SysError::InvalidMountInfoLine(line.to_string()));
        };

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields
            .next()
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;
        let source = right_fields.next().unwrap_or_default();

        entries.push(MountEntry {
            root: unescape_mount_field(root),
            mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            fs_type: fs_type.to_string(),
            source: unescape_mount_field(source),
        });
    }

    Ok(entries)
}

/// Whether `path` is currently a mountpoint according to `mountinfo`.
pub fn is_mount_point(mountinfo: &Path, path: &Path) -> Result<bool> {
    let path = fs::canonicalize(path)?;
    Ok(read_mountinfo(mountinfo)?
        .iter()
        .any(|entry| entry.mount_point == path))
}

/// Mount point of the first bind mount or regular mount backed by the device
/// `kernel_name`, if any.
pub fn bind_mount_of(entries: &[MountEntry], kernel_name: &str) -> Option<PathBuf> {
    let bind_root = format!("/{kernel_name}");
    let dev_source = format!("/dev/{kernel_name}");
    entries
        .iter()
        .find(|entry| entry.root == bind_root || entry.source == dev_source)
        .map(|entry| entry.mount_point.clone())
}

// mountinfo escapes space, tab, newline and backslash as three octal digits.
fn unescape_mount_field(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('\\') {
        output.push_str(&rest[..pos]);
        let escaped = rest.get(pos + 1..pos + 4);
        match escaped.and_then(|digits| u8::from_str_radix(digits, 8).ok()) {
            Some(byte) => {
                output.push(char::from(byte));
                rest = &rest[pos + 4..];
            }
            None => {
                output.push('\\');
                rest = &rest[pos + 1..];
            }
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "36 25 8:2 / / rw,relatime - ext4 /dev/nvme0n1p2 rw\n\
        612 600 0:5 /sdb /var/lib/kubelet/plugins/volumeDevices/pod rw,nosuid - devtmpfs devtmpfs rw\n\
        700 25 8:33 / /mnt/data\\040disk rw - xfs /dev/sdc rw\n";

    #[test]
    fn parses_entries_and_unescapes() {
        let entries = parse_mountinfo(SAMPLE).expect("parse should succeed");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].root, "/sdb");
        assert_eq!(entries[2].mount_point, PathBuf::from("/mnt/data disk"));
        assert_eq!(entries[2].source, "/dev/sdc");
        assert!(parse_mountinfo("bad line").is_err());
    }

    #[test]
    fn detects_bind_and_regular_mounts() {
        let entries = parse_mountinfo(SAMPLE).unwrap();
        assert_eq!(
            bind_mount_of(&entries, "sdb"),
            Some(PathBuf::from("/var/lib/kubelet/plugins/volumeDevices/pod"))
        );
        assert_eq!(bind_mount_of(&entries, "sdc"), Some(PathBuf::from("/mnt/data disk")));
        assert_eq!(bind_mount_of(&entries, "sdd"), None);
    }

    #[test]
    fn probes_mount_points() {
        let root = tempfile::tempdir().expect("tempdir");
        let mounted = fs::canonicalize(root.path()).unwrap();
        let table = root.path().join("mountinfo");
        fs::write(
            &table,
            format!("1 0 8:1 / {} rw - ext4 /dev/sdb rw\n", mounted.display()),
        )
        .unwrap();

        assert!(is_mount_point(&table, root.path()).unwrap());
        fs::create_dir(root.path().join("child")).unwrap();
        assert!(!is_mount_point(&table, &root.path().join("child")).unwrap());
    }
}
