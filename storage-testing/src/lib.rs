// SPDX-License-Identifier: GPL-3.0-only

//! Test support for the local storage diskmaker
//!
//! In-memory implementations of every contract in `storage-contracts`, a
//! temp-dir host layout and builders for the objects reconcilers consume.

pub mod cluster;
pub mod events;
pub mod fixtures;
pub mod harness;
pub mod host;

pub use cluster::FakeCluster;
pub use events::RecordingEvents;
pub use harness::Harness;
pub use host::{FakeDeviceLister, FakeVolumeUtil, FakeWiper, HostFixture};
