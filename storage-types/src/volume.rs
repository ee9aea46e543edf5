// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default filesystem used when a filesystem-mode class declares none.
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// How a published volume is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeMode {
    Block,
    #[default]
    Filesystem,
}

impl VolumeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "Block",
            Self::Filesystem => "Filesystem",
        }
    }
}

impl fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per storage class publishing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    /// Directory on the host holding the class symlinks
    pub host_dir: String,

    /// Same directory as seen by the daemon container
    pub mount_dir: String,

    pub volume_mode: VolumeMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
}

impl MountConfig {
    /// Filesystem type recorded on a filesystem-mode PV.
    pub fn effective_fs_type(&self) -> Option<String> {
        match self.volume_mode {
            VolumeMode::Block => None,
            VolumeMode::Filesystem => Some(
                self.fs_type
                    .clone()
                    .filter(|fs| !fs.is_empty())
                    .unwrap_or_else(|| DEFAULT_FS_TYPE.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_fs_type_only_for_filesystem_mode() {
        let mut config = MountConfig {
            host_dir: "/mnt/local-storage/fast".to_string(),
            mount_dir: "/mnt/local-storage/fast".to_string(),
            volume_mode: VolumeMode::Block,
            fs_type: Some("xfs".to_string()),
        };
        assert_eq!(config.effective_fs_type(), None);

        config.volume_mode = VolumeMode::Filesystem;
        assert_eq!(config.effective_fs_type().as_deref(), Some("xfs"));

        config.fs_type = None;
        assert_eq!(config.effective_fs_type().as_deref(), Some(DEFAULT_FS_TYPE));
    }
}
