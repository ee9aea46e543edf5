// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the local storage diskmaker
//!
//! This crate defines the single source of truth for the types shared across
//! the stack:
//!
//! - **storage-sys**: builds `BlockDevice` records from host tooling
//! - **storage-contracts**: exchanges these types across the cluster seams
//! - **storage-diskmaker**: classifies devices and publishes volumes for the
//!   `LocalVolume` / `LocalVolumeSet` owner declarations

pub mod common;
pub mod conditions;
pub mod device;
pub mod error;
pub mod events;
pub mod inclusion;
pub mod labels;
pub mod local_volume;
pub mod local_volume_set;
pub mod selector;
pub mod volume;

pub use common::{GIB, KIB, MIB, TIB, bytes_to_quantity, parse_quantity, round_down_capacity};
pub use conditions::{OperatorCondition, set_condition};
pub use device::{BlockDevice, DeviceType, parse_tri_state};
pub use error::TypesError;
pub use events::{DiskEvent, EventType};
pub use inclusion::{DeviceInclusionSpec, DeviceMechanicalProperty};
pub use labels::{OwnerIdentity, provisioner_name};
pub use local_volume::{
    LOCAL_VOLUME_KIND, LocalVolume, LocalVolumeSpec, LocalVolumeStatus, StorageClassDevice,
};
pub use local_volume_set::{
    LOCAL_VOLUME_SET_KIND, LocalVolumeSet, LocalVolumeSetSpec, LocalVolumeSetStatus,
};
pub use selector::node_matches;
pub use volume::{MountConfig, VolumeMode};
