// SPDX-License-Identifier: GPL-3.0-only

//! PV watch handling: keeps the cache current and enqueues owners

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use storage_types::OwnerIdentity;
use storage_types::labels::PROVISIONED_BY_ANNOTATION;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::cache::PvCache;
use crate::owner_index::StorageClassOwnerIndex;

/// Delay before the second enqueue that follows a PV deletion, leaving the
/// deleter time to mark its cleanup finished.
pub const DELETE_REQUEUE_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub enum PvEvent {
    Applied(PersistentVolume),
    Deleted(PersistentVolume),
}

pub struct Observer {
    provisioner_name: String,
    cache: Arc<PvCache>,
    owner_index: Arc<StorageClassOwnerIndex>,
    enqueue: UnboundedSender<OwnerIdentity>,
    delete_delay: Duration,
}

impl Observer {
    pub fn new(
        provisioner_name: String,
        cache: Arc<PvCache>,
        owner_index: Arc<StorageClassOwnerIndex>,
        enqueue: UnboundedSender<OwnerIdentity>,
    ) -> Self {
        Self {
            provisioner_name,
            cache,
            owner_index,
            enqueue,
            delete_delay: DELETE_REQUEUE_DELAY,
        }
    }

    pub fn with_delete_delay(mut self, delete_delay: Duration) -> Self {
        self.delete_delay = delete_delay;
        self
    }

    pub fn handle(&self, event: PvEvent) {
        let (pv, deleted) = match event {
            PvEvent::Applied(pv) => (pv, false),
            PvEvent::Deleted(pv) => (pv, true),
        };

        let provisioned_by = pv.annotations().get(PROVISIONED_BY_ANNOTATION);
        if provisioned_by.map(String::as_str) != Some(self.provisioner_name.as_str()) {
            trace!(pv = %pv.name_any(), "ignoring PV from another provisioner");
            return;
        }

        let owners = self.owners_of(&pv);
        if deleted {
            self.cache.delete(&pv.name_any());
        } else {
            self.cache.add_or_update(pv.clone());
        }
        debug!(pv = %pv.name_any(), deleted, owners = owners.len(), "observed PV change");

        for owner in owners {
            let _ = self.enqueue.send(owner.clone());
            if deleted {
                let enqueue = self.enqueue.clone();
                let delay = self.delete_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = enqueue.send(owner);
                });
            }
        }
    }

    /// Owner from the PV labels, falling back to every owner of its class.
    fn owners_of(&self, pv: &PersistentVolume) -> Vec<OwnerIdentity> {
        if let Some(owner) = OwnerIdentity::from_labels(pv.labels()) {
            return vec![owner];
        }
        pv.spec
            .as_ref()
            .and_then(|spec| spec.storage_class_name.as_deref())
            .map(|class| self.owner_index.owners_for(class))
            .unwrap_or_default()
    }
}
