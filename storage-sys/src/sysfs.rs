// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::io;
use std::path::Path;

use crate::Result;

/// Whether `/sys/block/<kname>` lists partition children (`<kname>1`, `<kname>p1`, ...).
pub fn has_children(sys_block_dir: &Path, kernel_name: &str) -> Result<bool> {
    let entries = match fs::read_dir(sys_block_dir.join(kernel_name)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(kernel_name) && name != kernel_name {
            return Ok(true);
        }
    }
    Ok(false)
}
