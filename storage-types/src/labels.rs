// SPDX-License-Identifier: GPL-3.0-only

//! Labels, annotations and finalizers shared by the daemon and its tests.
//!
//! PVs are linked back to their owner declaration only through these labels;
//! nothing holds a pointer to an owner object.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

pub const OWNER_KIND_LABEL: &str = "storage.openshift.com/owner-kind";
pub const OWNER_NAMESPACE_LABEL: &str = "storage.openshift.com/owner-namespace";
pub const OWNER_NAME_LABEL: &str = "storage.openshift.com/owner-name";
pub const DEVICE_NAME_LABEL: &str = "storage.openshift.com/device-name";
pub const DEVICE_ID_LABEL: &str = "storage.openshift.com/device-id";

pub const PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";

/// Finalizer held on owners while any of their PVs may still be bound.
pub const OWNER_FINALIZER: &str = "storage.openshift.com/local-volume-protection";

pub const PV_NAME_PREFIX: &str = "local-pv-";

/// Provisioner identity written to the `provisioned-by` annotation.
pub fn provisioner_name(node_name: &str, node_uid: &str) -> String {
    format!("local-volume-provisioner-{node_name}-{node_uid}")
}

/// Identity of an owner declaration, used as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerIdentity {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl OwnerIdentity {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Owner labels stamped on every PV this owner publishes.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (OWNER_KIND_LABEL.to_string(), self.kind.clone()),
            (OWNER_NAMESPACE_LABEL.to_string(), self.namespace.clone()),
            (OWNER_NAME_LABEL.to_string(), self.name.clone()),
        ])
    }

    /// Label selector string matching PVs owned by this identity.
    pub fn label_selector(&self) -> String {
        format!(
            "{OWNER_KIND_LABEL}={},{OWNER_NAMESPACE_LABEL}={},{OWNER_NAME_LABEL}={}",
            self.kind, self.namespace, self.name
        )
    }

    /// Recover the owner identity from a PV's labels.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            kind: labels.get(OWNER_KIND_LABEL)?.clone(),
            namespace: labels.get(OWNER_NAMESPACE_LABEL)?.clone(),
            name: labels.get(OWNER_NAME_LABEL)?.clone(),
        })
    }

    /// Whether a label map carries exactly this owner.
    pub fn owns(&self, labels: &BTreeMap<String, String>) -> bool {
        Self::from_labels(labels).as_ref() == Some(self)
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_labels_roundtrip() {
        let owner = OwnerIdentity::new("LocalVolume", "openshift-local-storage", "disks");
        let labels = owner.labels();
        assert_eq!(OwnerIdentity::from_labels(&labels), Some(owner.clone()));
        assert!(owner.owns(&labels));

        let other = OwnerIdentity::new("LocalVolumeSet", "openshift-local-storage", "disks");
        assert!(!other.owns(&labels));
    }

    #[test]
    fn selector_and_provisioner_names() {
        let owner = OwnerIdentity::new("LocalVolumeSet", "ns", "set");
        assert_eq!(
            owner.label_selector(),
            "storage.openshift.com/owner-kind=LocalVolumeSet,storage.openshift.com/owner-namespace=ns,storage.openshift.com/owner-name=set"
        );
        assert_eq!(
            provisioner_name("worker-0", "1234"),
            "local-volume-provisioner-worker-0-1234"
        );
    }
}
