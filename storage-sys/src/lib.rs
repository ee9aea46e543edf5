// SPDX-License-Identifier: GPL-3.0-only

//! Low-level host operations for the local storage diskmaker
//!
//! This crate provides direct interfaces to the host that do not go through
//! the API server, such as:
//! - Block device enumeration (`lsblk`, `blkid`) and signature wiping (`wipefs`)
//! - Stable by-id identity resolution
//! - Exclusive device locking and symlink management
//! - Mount table probes and capacity ioctls
//!
//! These operations require elevated privileges and should only be called
//! from the privileged node daemon.

pub mod blkid;
pub mod capacity;
pub mod command;
pub mod error;
pub mod identity;
pub mod lock;
pub mod lsblk;
pub mod mounts;
pub mod paths;
pub mod symlink;
pub mod sysfs;
pub mod wipefs;

pub use error::{Result, SysError};
pub use identity::{path_by_id, resolve_device_path, ResolvedDevice};
pub use lock::{find_symlinks_resolving_to, pv_creation_lock, try_exclusive_open, ExclusiveLock, PvCreationLock};
pub use lsblk::{list_block_devices, ListOutcome};
pub use paths::{HostPaths, DEFAULT_SYMLINK_ROOT};
pub use symlink::{create_symlink, orphaned_symlinks, plan_symlink, SymlinkOutcome, SymlinkPlan};
