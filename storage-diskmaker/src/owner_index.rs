// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use storage_types::OwnerIdentity;

/// Storage class name to the owners publishing into it. PV events carry a
/// class name, and this index fans them back out to interested owners.
#[derive(Default)]
pub struct StorageClassOwnerIndex {
    owners: Mutex<BTreeMap<String, BTreeSet<OwnerIdentity>>>,
}

impl StorageClassOwnerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, storage_class: &str, owner: &OwnerIdentity) {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(storage_class.to_string())
            .or_default()
            .insert(owner.clone());
    }

    /// Drop `owner` from every class.
    pub fn deregister(&self, owner: &OwnerIdentity) {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        owners.retain(|_, set| {
            set.remove(owner);
            !set.is_empty()
        });
    }

    pub fn owners_for(&self, storage_class: &str) -> Vec<OwnerIdentity> {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(storage_class)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_deregisters_owners() {
        let index = StorageClassOwnerIndex::new();
        let a = OwnerIdentity::new("LocalVolume", "ns", "a");
        let b = OwnerIdentity::new("LocalVolume", "ns", "b");

        index.register("fast", &a);
        index.register("fast", &a);
        index.register("fast", &b);
        index.register("slow", &a);
        assert_eq!(index.owners_for("fast"), vec![a.clone(), b.clone()]);

        index.deregister(&a);
        assert_eq!(index.owners_for("fast"), vec![b]);
        assert!(index.owners_for("slow").is_empty());
    }
}
