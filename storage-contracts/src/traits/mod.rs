// SPDX-License-Identifier: GPL-3.0-only

pub mod cluster;
pub mod events;
pub mod host;

pub use cluster::ClusterApi;
pub use events::EventSink;
pub use host::{DeviceLister, DeviceListing, DeviceWiper, VolumeUtil};
