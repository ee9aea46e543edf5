// SPDX-License-Identifier: GPL-3.0-only

//! A daemon context wired to fakes

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use storage_diskmaker::age::ManualClock;
use storage_diskmaker::{Collaborators, DaemonContext, Settings};
use storage_types::labels::PROVISIONED_BY_ANNOTATION;
use storage_types::provisioner_name;

use crate::fixtures::{self, NODE_NAME, NODE_UID};
use crate::{FakeCluster, FakeDeviceLister, FakeVolumeUtil, FakeWiper, HostFixture, RecordingEvents};

pub struct Harness {
    pub host: HostFixture,
    pub cluster: Arc<FakeCluster>,
    pub events: Arc<RecordingEvents>,
    pub lister: Arc<FakeDeviceLister>,
    pub wiper: Arc<FakeWiper>,
    pub volumes: Arc<FakeVolumeUtil>,
    pub clock: Arc<ManualClock>,
    pub ctx: DaemonContext,
}

impl Harness {
    /// Fakes plus the node object; devices are claimable on first sight.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_device_min_age(Duration::ZERO)
    }

    pub fn with_device_min_age(device_min_age: Duration) -> anyhow::Result<Self> {
        let host = HostFixture::new()?;
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_node(fixtures::node());
        let events = Arc::new(RecordingEvents::new());
        let lister = Arc::new(FakeDeviceLister::new());
        let wiper = Arc::new(FakeWiper::new());
        let volumes = Arc::new(FakeVolumeUtil::new());
        let clock = Arc::new(ManualClock::new());

        let settings = Settings::new(NODE_NAME, host.symlink_root.clone())
            .with_device_min_age(device_min_age)
            .with_host_paths(host.paths.clone());
        let collaborators = Collaborators {
            api: cluster.clone(),
            events: events.clone(),
            lister: lister.clone(),
            wiper: wiper.clone(),
            volume_util: volumes.clone(),
        };
        let ctx = DaemonContext::with_clock(settings, collaborators, clock.clone());

        Ok(Self {
            host,
            cluster,
            events,
            lister,
            wiper,
            volumes,
            clock,
            ctx,
        })
    }

    pub fn provisioner_name(&self) -> String {
        provisioner_name(NODE_NAME, NODE_UID)
    }

    /// Deliver every PV of this node to the cache, as the PV watch would.
    pub fn sync_cache(&self) {
        let provisioner = self.provisioner_name();
        for pv in self.cluster.pvs() {
            if pv.annotations().get(PROVISIONED_BY_ANNOTATION) == Some(&provisioner) {
                self.ctx.cache.add_or_update(pv);
            }
        }
        for cached in self.ctx.cache.list() {
            let name = cached.name_any();
            if self.cluster.pv(&name).is_none() {
                self.ctx.cache.delete(&name);
            }
        }
    }
}
