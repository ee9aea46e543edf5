// SPDX-License-Identifier: GPL-3.0-only

//! Declarative device selection policy attached to a `LocalVolumeSet`.

use serde::{Deserialize, Serialize};

use crate::common::parse_quantity;
use crate::device::DeviceType;
use crate::TypesError;

/// Rotational class of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceMechanicalProperty {
    Rotational,
    NonRotational,
}

/// Device selection policy. Absent fields impose no constraint, except
/// `device_types` which defaults to raw disks only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInclusionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_mechanical_properties: Option<Vec<DeviceMechanicalProperty>>,

    /// Inclusive lower bound, as a quantity string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<String>,

    /// Inclusive upper bound, as a quantity string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
}

impl DeviceInclusionSpec {
    /// Accepted device types, defaulting to `[disk]`.
    pub fn accepted_types(&self) -> Vec<DeviceType> {
        match &self.device_types {
            Some(types) if !types.is_empty() => {
                types.iter().map(|value| DeviceType::parse(value)).collect()
            }
            _ => vec![DeviceType::Disk],
        }
    }

    pub fn min_size_bytes(&self) -> Result<Option<u64>, TypesError> {
        self.min_size.as_deref().map(parse_quantity).transpose()
    }

    pub fn max_size_bytes(&self) -> Result<Option<u64>, TypesError> {
        self.max_size.as_deref().map(parse_quantity).transpose()
    }
}
