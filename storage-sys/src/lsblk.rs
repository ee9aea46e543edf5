// SPDX-License-Identifier: GPL-3.0-only

//! Block device enumeration through `lsblk --pairs`

use std::collections::HashMap;
use std::path::Path;

use storage_types::{BlockDevice, DeviceType};
use tracing::{debug, warn};

use crate::blkid;
use crate::command;
use crate::{Result, SysError};

/// Columns requested from lsblk, in output order.
pub const LSBLK_COLUMNS: &[&str] = &[
    "NAME", "ROTA", "TYPE", "SIZE", "MODEL", "VENDOR", "RO", "RM", "STATE", "KNAME", "SERIAL",
    "PARTLABEL",
];

/// Devices parsed from one enumeration, plus rows that could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOutcome {
    pub devices: Vec<BlockDevice>,
    pub bad_rows: Vec<String>,
}

pub fn lsblk_args() -> Vec<String> {
    vec![
        "--list".to_string(),
        "--bytes".to_string(),
        "--pairs".to_string(),
        "--paths".to_string(),
        "--output".to_string(),
        LSBLK_COLUMNS.join(","),
    ]
}

/// Enumerate every block device on the host and overlay filesystem signatures.
///
/// `paths` restricts the signature lookup only; enumeration is never filtered.
pub fn list_block_devices(paths: &[String]) -> Result<ListOutcome> {
    let output = command::run("lsblk", &lsblk_args())?;
    let mut outcome = parse_lsblk_output(&output)?;
    if !outcome.bad_rows.is_empty() {
        warn!(bad_rows = ?outcome.bad_rows, "lsblk returned unparseable rows");
    }

    let signatures = blkid::filesystem_signatures(paths)?;
    overlay_fs_types(&mut outcome.devices, &signatures);

    debug!("Found {} block devices", outcome.devices.len());
    Ok(outcome)
}

pub fn overlay_fs_types(devices: &mut [BlockDevice], signatures: &HashMap<String, String>) {
    for device in devices {
        if let Some(fs_type) = signatures
            .get(&device.dev_path())
            .or_else(|| signatures.get(&device.name))
        {
            device.fs_type = fs_type.clone();
        }
    }
}

/// Parse pair-formatted lsblk output.
///
/// Output with no lines at all is an empty listing. Output whose every row is
/// unparseable is an error.
pub fn parse_lsblk_output(output: &str) -> Result<ListOutcome> {
    let mut outcome = ListOutcome::default();

    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        match parse_pairs(line).and_then(|pairs| device_from_pairs(&pairs)) {
            Some(device) => outcome.devices.push(device),
            None => outcome.bad_rows.push(line.to_string()),
        }
    }

    if outcome.devices.is_empty() && !outcome.bad_rows.is_empty() {
        return Err(SysError::NoParseableRows {
            bad_rows: outcome.bad_rows,
        });
    }

    Ok(outcome)
}

/// Split `KEY="value" KEY2="value with spaces"` into a map. Values may carry
/// `\xHH` escapes and escaped quotes.
pub fn parse_pairs(line: &str) -> Option<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    let mut chars = line.trim().chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        if key.is_empty() || chars.next() != Some('"') {
            return None;
        }

        // `\xHH` escapes are raw bytes, so a multibyte character spans several.
        let mut value = Vec::new();
        let mut closed = false;
        let mut utf8 = [0u8; 4];
        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' => match chars.next()? {
                    'x' => {
                        let hex: String = [chars.next()?, chars.next()?].iter().collect();
                        value.push(u8::from_str_radix(&hex, 16).ok()?);
                    }
                    escaped => value.extend_from_slice(escaped.encode_utf8(&mut utf8).as_bytes()),
                },
                other => value.extend_from_slice(other.encode_utf8(&mut utf8).as_bytes()),
            }
        }
        if !closed {
            return None;
        }

        pairs.insert(key, String::from_utf8_lossy(&value).into_owned());
    }

    Some(pairs)
}

fn device_from_pairs(pairs: &HashMap<String, String>) -> Option<BlockDevice> {
    let column = |name: &str| pairs.get(name).map(|v| v.trim().to_string()).unwrap_or_default();

    let name = column("NAME");
    if name.is_empty() {
        return None;
    }

    let kname = column("KNAME");
    let kernel_name = base_name(if kname.is_empty() { &name } else { &kname });

    let size = column("SIZE");
    let size_bytes = if size.is_empty() { 0 } else { size.parse().ok()? };

    Some(BlockDevice {
        kernel_name,
        name,
        device_type: DeviceType::parse(&column("TYPE")),
        size_bytes,
        model: column("MODEL"),
        vendor: column("VENDOR"),
        serial: column("SERIAL"),
        partition_label: column("PARTLABEL"),
        rotational: column("ROTA"),
        read_only: column("RO"),
        removable: column("RM"),
        state: column("STATE"),
        fs_type: String::new(),
        path_by_id: String::new(),
    })
}

fn base_name(value: &str) -> String {
    Path::new(value)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"NAME="/dev/sda" ROTA="1" TYPE="disk" SIZE="62914560000" MODEL="VBOX HARDDISK" VENDOR="ATA     " RO="0" RM="0" STATE="running" KNAME="/dev/sda" SERIAL="VB1" PARTLABEL=""
NAME="/dev/sda1" ROTA="1" TYPE="part" SIZE="1048576" MODEL="" VENDOR="" RO="0" RM="0" STATE="" KNAME="/dev/sda1" SERIAL="" PARTLABEL="EFI\x20System"
"#;

    #[test]
    fn parses_pairs_with_spaces_and_escapes() {
        let devices = parse_lsblk_output(SAMPLE).expect("parse should succeed").devices;
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].kernel_name, "sda");
        assert_eq!(devices[0].model, "VBOX HARDDISK");
        assert_eq!(devices[0].vendor, "ATA");
        assert_eq!(devices[0].size_bytes, 62_914_560_000);
        assert_eq!(devices[0].device_type, DeviceType::Disk);
        assert_eq!(devices[1].device_type, DeviceType::Part);
        assert_eq!(devices[1].partition_label, "EFI System");
    }

    #[test]
    fn decodes_escaped_multibyte_labels() {
        let pairs = parse_pairs(r#"NAME="/dev/sdb1" PARTLABEL="caf\xc3\xa9\x20data" MODEL="bad\xff""#)
            .expect("pairs");
        assert_eq!(pairs["PARTLABEL"], "café data");
        assert_eq!(pairs["MODEL"], "bad\u{fffd}");
    }

    #[test]
    fn reports_bad_rows_beside_good_ones() {
        let output = format!("{SAMPLE}NAME=\"\" TYPE=\"disk\"\nNAME=\"/dev/sdc\" SIZE=\"abc\"\n");
        let outcome = parse_lsblk_output(&output).expect("mixed output should parse");
        assert_eq!(outcome.devices.len(), 2);
        assert_eq!(outcome.bad_rows.len(), 2);
    }

    #[test]
    fn all_bad_rows_is_an_error_but_empty_output_is_not() {
        assert!(matches!(
            parse_lsblk_output("garbage\nNAME=unquoted\n"),
            Err(SysError::NoParseableRows { .. })
        ));
        assert!(parse_lsblk_output("\n").expect("empty listing").devices.is_empty());
    }

    #[test]
    fn overlays_filesystem_signatures() {
        let mut devices = parse_lsblk_output(SAMPLE).unwrap().devices;
        let signatures = HashMap::from([("/dev/sda1".to_string(), "vfat".to_string())]);
        overlay_fs_types(&mut devices, &signatures);
        assert_eq!(devices[0].fs_type, "");
        assert_eq!(devices[1].fs_type, "vfat");
    }
}
