// SPDX-License-Identifier: GPL-3.0-only

//! Node daemon that turns matching local block devices into persistent
//! volumes.
//!
//! Owner declarations (`LocalVolume`, `LocalVolumeSet`) drive a reconcile
//! cycle per owner: released volumes are drained, stale symlinks counted or
//! removed, devices enumerated and classified, stable symlinks created under
//! the per-class directory and one `PersistentVolume` published per symlink.

pub mod adapters;
pub mod age;
pub mod cache;
pub mod classify;
pub mod config;
pub mod context;
pub mod controller;
pub mod deleter;
pub mod error;
pub mod events;
pub mod metrics;
pub mod observer;
pub mod owner_index;
pub mod pv;
pub mod reconcile;
pub mod runtime;

pub use config::{DaemonConfig, Settings};
pub use context::{Collaborators, DaemonContext};
pub use error::{DiskmakerError, Result};
pub use reconcile::{Requeue, reconcile_local_volume, reconcile_local_volume_set};
