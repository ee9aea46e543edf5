// SPDX-License-Identifier: GPL-3.0-only

pub mod cluster;
pub mod events;
pub mod host;

use std::sync::Arc;

use kube::Client;
use kube::runtime::events::Reporter;

use crate::config::Settings;
use crate::context::Collaborators;

pub use cluster::KubeClusterApi;
pub use events::RecorderEventSink;
pub use host::{SysDeviceLister, SysDeviceWiper, SysVolumeUtil};

/// Name events are reported under.
pub const REPORTING_CONTROLLER: &str = "local-storage-diskmaker";

/// Production collaborators: API server, event recorder and the host.
pub fn build_default_adapters(client: Client, settings: &Settings) -> Collaborators {
    let reporter = Reporter {
        controller: REPORTING_CONTROLLER.to_string(),
        instance: Some(settings.node_name.clone()),
    };

    Collaborators {
        api: Arc::new(KubeClusterApi::new(client.clone())),
        events: Arc::new(RecorderEventSink::new(client, reporter)),
        lister: Arc::new(SysDeviceLister),
        wiper: Arc::new(SysDeviceWiper),
        volume_util: Arc::new(SysVolumeUtil::new(&settings.host_paths.self_mountinfo)),
    }
}
