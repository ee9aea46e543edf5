// SPDX-License-Identifier: GPL-3.0-only

//! Seams between the diskmaker and the outside world
//!
//! The daemon talks to the API server, the event stream and the host only
//! through these traits, so reconcilers run unchanged against in-memory fakes.

pub mod protocol;
pub mod traits;

pub use protocol::{StorageError, StorageErrorKind};
pub use traits::{
    ClusterApi, DeviceLister, DeviceListing, DeviceWiper, EventSink, VolumeUtil,
};
