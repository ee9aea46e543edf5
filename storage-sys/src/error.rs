// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{command} exited with {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("no parseable rows in block device listing ({} bad rows)", bad_rows.len())]
    NoParseableRows { bad_rows: Vec<String> },

    #[error("device {0:?} is busy")]
    DeviceBusy(PathBuf),

    #[error("invalid device path {path:?}: {reason}")]
    InvalidDevicePath { path: PathBuf, reason: String },

    #[error("symlink {target:?} already exists and points to {existing:?}")]
    SymlinkConflict { target: PathBuf, existing: PathBuf },

    #[error("{0:?} is not a mountpoint")]
    NotMounted(PathBuf),

    #[error("{path:?} is neither a block device nor a directory")]
    UnsupportedVolumeType { path: PathBuf },

    #[error("invalid mountinfo line: {0}")]
    InvalidMountInfoLine(String),

    #[error("ioctl failed on {path:?}: {source}")]
    Ioctl {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
}

impl SysError {
    /// Busy devices and lock contention are retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeviceBusy(_))
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
