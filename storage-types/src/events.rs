// SPDX-License-Identifier: GPL-3.0-only

//! Diagnostic events emitted against owner declarations

use std::fmt;

use serde::{Deserialize, Serialize};

pub const ERROR_RUNNING_BLOCK_LIST: &str = "ErrorRunningBlockList";
pub const ERROR_LISTING_DEVICE_ID: &str = "ErrorListingDeviceID";
pub const ERROR_FINDING_MATCHING_DISK: &str = "ErrorFindingMatchingDisk";
pub const ERROR_CREATING_SYMLINK: &str = "ErrorCreatingSymLink";
pub const ERROR_PROVISIONING_DEVICE: &str = "ErrorProvisioningDevice";
pub const ERROR_WIPING_DEVICE: &str = "ErrorWipingDevice";
pub const ERROR_REMOVING_SYMLINK: &str = "ErrorRemovingSymLink";
pub const DEVICE_FILTER_ERROR: &str = "DeviceFilterError";
pub const FOUND_MATCHING_DISK: &str = "FoundMatchingDisk";
pub const DEVICE_SYMLINK_EXISTS: &str = "DeviceSymlinkExists";
pub const SYMLINKED_ON_DEVICE_NAME: &str = "SymLinkedOnDeviceName";
pub const DISCOVERED_NEW_DEVICE: &str = "DiscoveredNewDevice";
pub const PV_MODE_MISMATCH: &str = "PersistentVolumeModeMismatch";
pub const MOUNT_OPTIONS_IGNORED: &str = "MountOptionsIgnored";
pub const MISSING_RECLAIM_POLICY: &str = "MissingReclaimPolicy";
pub const DELETION_BLOCKED: &str = "DeletionBlocked";
pub const RELEASED_AVAILABLE_PV: &str = "ReleasedAvailablePV";
pub const INVALID_NODE_SELECTOR: &str = "InvalidNodeSelector";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

/// A diagnostic event, optionally tied to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskEvent {
    pub reason: String,
    pub event_type: EventType,
    pub message: String,

    /// Device the event is about; empty for owner-wide events
    pub device: String,
}

impl DiskEvent {
    pub fn new(reason: &str, event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            reason: reason.to_string(),
            event_type,
            message: message.into(),
            device: String::new(),
        }
    }

    pub fn warning(reason: &str, message: impl Into<String>) -> Self {
        Self::new(reason, EventType::Warning, message)
    }

    pub fn normal(reason: &str, message: impl Into<String>) -> Self {
        Self::new(reason, EventType::Normal, message)
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Deduplication key: (reason, type, device)
    pub fn key(&self) -> (String, EventType, String) {
        (self.reason.clone(), self.event_type, self.device.clone())
    }
}
