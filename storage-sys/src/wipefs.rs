// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use tracing::info;

use crate::command;
use crate::Result;

/// Erase every filesystem, raid and partition-table signature on `device`.
pub fn wipe_device(device: &Path) -> Result<()> {
    let args = vec![
        "-a".to_string(),
        "-f".to_string(),
        device.to_string_lossy().to_string(),
    ];
    command::run("wipefs", &args)?;
    info!(device = %device.display(), "wiped device signatures");
    Ok(())
}
