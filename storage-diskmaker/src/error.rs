// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use storage_contracts::StorageError;
use storage_sys::SysError;
use storage_types::TypesError;
use thiserror::Error;

/// Errors surfaced by the diskmaker reconcilers
#[derive(Debug, Error)]
pub enum DiskmakerError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error(transparent)]
    Cluster(#[from] StorageError),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error("no mount configuration for storage class {0}")]
    MissingMountConfig(String),

    #[error("node {0} has no kubernetes.io/hostname label")]
    MissingHostnameLabel(String),

    #[error("storage class {class} requests Block mode but {path:?} is a filesystem")]
    BlockRequestedOnFilesystem { class: String, path: PathBuf },

    #[error("{0:?} is not a mountpoint")]
    NotMounted(PathBuf),

    #[error("{0} timed out")]
    Timeout(String),
}

impl DiskmakerError {
    /// Conflicts, timeouts and busy devices are retried quickly.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cluster(e) => e.is_transient(),
            Self::Sys(e) => e.is_transient(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiskmakerError>;

#[cfg(test)]
mod tests {
    use storage_contracts::StorageErrorKind;

    use super::*;

    #[test]
    fn only_cluster_races_and_timeouts_are_transient() {
        let conflict = StorageError::new(StorageErrorKind::Conflict, "stale resourceVersion");
        assert!(DiskmakerError::from(conflict).is_transient());
        assert!(DiskmakerError::Timeout("create PV".to_string()).is_transient());

        let missing = StorageError::not_found("persistentvolumes \"local-pv-1\" not found");
        assert!(!DiskmakerError::from(missing).is_transient());
        assert!(!DiskmakerError::MissingMountConfig("fast".to_string()).is_transient());
        assert!(!DiskmakerError::NotMounted(PathBuf::from("/mnt/local-storage/fast/sdb")).is_transient());
    }
}
