// SPDX-License-Identifier: GPL-3.0-only

//! Per-owner provisioning gauges

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use storage_types::OwnerIdentity;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GaugeKey {
    pub owner: OwnerIdentity,
    pub storage_class: String,
    pub node: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionGauges {
    /// Symlinks present in the class directory after the reconcile
    pub provisioned: usize,
    pub orphaned_symlinks: usize,
    pub unmatched_devices: usize,
}

#[derive(Default)]
pub struct ProvisionMetrics {
    gauges: Mutex<BTreeMap<GaugeKey, ProvisionGauges>>,
}

impl ProvisionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: GaugeKey, gauges: ProvisionGauges) {
        info!(
            owner = %key.owner,
            storage_class = %key.storage_class,
            node = %key.node,
            provisioned = gauges.provisioned,
            orphaned_symlinks = gauges.orphaned_symlinks,
            unmatched_devices = gauges.unmatched_devices,
            "provisioning gauges"
        );
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, gauges);
    }

    pub fn get(&self, key: &GaugeKey) -> Option<ProvisionGauges> {
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn remove_owner(&self, owner: &OwnerIdentity) {
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| &key.owner != owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_forgets_owner_gauges() {
        let metrics = ProvisionMetrics::new();
        let owner = OwnerIdentity::new("LocalVolumeSet", "ns", "set");
        let key = GaugeKey {
            owner: owner.clone(),
            storage_class: "fast".to_string(),
            node: "worker-0".to_string(),
        };
        let gauges = ProvisionGauges {
            provisioned: 2,
            orphaned_symlinks: 0,
            unmatched_devices: 1,
        };

        metrics.record(key.clone(), gauges);
        assert_eq!(metrics.get(&key), Some(gauges));
        metrics.remove_owner(&owner);
        assert_eq!(metrics.get(&key), None);
    }
}
