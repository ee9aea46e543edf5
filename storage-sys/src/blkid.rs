// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem signature lookup through `blkid`

use std::collections::HashMap;

use tracing::debug;

use crate::command;
use crate::Result;

/// blkid exit status meaning no device or token matched.
const BLKID_NOTHING_FOUND: i32 = 2;

/// Map of device path to detected filesystem type.
///
/// When `paths` is non-empty only those devices are probed.
pub fn filesystem_signatures(paths: &[String]) -> Result<HashMap<String, String>> {
    let mut args = vec!["-s".to_string(), "TYPE".to_string()];
    args.extend(paths.iter().cloned());

    let output = command::run_raw("blkid", &args)?;
    if output.status.code() == Some(BLKID_NOTHING_FOUND) {
        debug!("blkid found no signatures");
        return Ok(HashMap::new());
    }
    if !output.status.success() {
        return Err(command::failure("blkid", &args, &output));
    }

    Ok(parse_blkid_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `"/dev/sdb1: TYPE=\"ext4\""` lines; lines without a TYPE are skipped.
pub fn parse_blkid_output(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (device, tokens) = line.split_once(": ")?;
            let fs_type = tokens
                .split_whitespace()
                .find_map(|token| token.strip_prefix("TYPE=\""))?
                .trim_end_matches('"');
            if fs_type.is_empty() {
                return None;
            }
            Some((device.trim().to_string(), fs_type.to_string()))
        })
        .collect()
}
