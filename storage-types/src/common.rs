// SPDX-License-Identifier: GPL-3.0-only

//! Capacity and quantity helpers shared across crates

use crate::TypesError;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;
pub const PIB: u64 = 1024 * TIB;
pub const EIB: u64 = 1024 * PIB;

/// Minimum number of whole units a capacity must hold before it is rounded
/// down to that unit.
const MIN_UNITS_FOR_ROUNDING: u64 = 10;

/// Round a byte capacity down to whole GiB, then whole MiB, when at least ten
/// of that unit fit. Smaller values are returned unchanged.
pub fn round_down_capacity(bytes: u64) -> u64 {
    for unit in [GIB, MIB] {
        let units = bytes / unit;
        if units >= MIN_UNITS_FOR_ROUNDING {
            return units * unit;
        }
    }
    bytes
}

const BINARY_SUFFIXES: &[(&str, u64)] = &[
    ("Ei", EIB),
    ("Pi", PIB),
    ("Ti", TIB),
    ("Gi", GIB),
    ("Mi", MIB),
    ("Ki", KIB),
];

const DECIMAL_SUFFIXES: &[(&str, u64)] = &[
    ("E", 1_000_000_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("T", 1_000_000_000_000),
    ("G", 1_000_000_000),
    ("M", 1_000_000),
    ("k", 1_000),
];

/// Parse a Kubernetes quantity (e.g. "10Gi", "500M", "1.5Ti", "1024", "1500m")
/// into bytes. Fractional results are truncated.
pub fn parse_quantity(quantity: &str) -> Result<u64, TypesError> {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return Err(TypesError::InvalidQuantity(quantity.to_string()));
    }

    if let Some(milli) = trimmed.strip_suffix('m') {
        let value: f64 = milli
            .parse()
            .map_err(|_| TypesError::InvalidQuantity(quantity.to_string()))?;
        if !value.is_finite() || value < 0.0 || milli.starts_with('-') {
            return Err(TypesError::InvalidQuantity(quantity.to_string()));
        }
        return Ok((value / 1000.0) as u64);
    }

    let (number, multiplier) = BINARY_SUFFIXES
        .iter()
        .chain(DECIMAL_SUFFIXES.iter())
        .find_map(|(suffix, multiplier)| {
            trimmed
                .strip_suffix(suffix)
                .map(|number| (number, *multiplier))
        })
        .unwrap_or((trimmed, 1));

    if number.is_empty() || number.starts_with('-') {
        return Err(TypesError::InvalidQuantity(quantity.to_string()));
    }

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| TypesError::InvalidQuantity(quantity.to_string()));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| TypesError::InvalidQuantity(quantity.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(TypesError::InvalidQuantity(quantity.to_string()));
    }

    let bytes = value * multiplier as f64;
    if bytes > u64::MAX as f64 {
        return Err(TypesError::InvalidQuantity(quantity.to_string()));
    }
    Ok(bytes as u64)
}

/// Render bytes as a canonical binary-SI quantity string ("10Gi", "12345").
pub fn bytes_to_quantity(bytes: u64) -> String {
    if bytes == 0 {
        return "0".to_string();
    }

    for (suffix, unit) in BINARY_SUFFIXES {
        if bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }

    bytes.to_string()
}
