// SPDX-License-Identifier: GPL-3.0-only

//! Invocation of external host tools

use std::process::{Command, Output};

use tracing::debug;

use crate::{Result, SysError};

pub fn render(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

/// Run a tool found in PATH and return its raw output, whatever the exit status.
pub fn run_raw(command: &str, args: &[String]) -> Result<Output> {
    let binary = which::which(command).map_err(|_| SysError::ToolNotFound(command.to_string()))?;
    debug!(command = %render(command, args), "running host tool");
    Ok(Command::new(binary).args(args).output()?)
}

/// Run a tool and return stdout, failing on a nonzero exit status.
pub fn run(command: &str, args: &[String]) -> Result<String> {
    let output = run_raw(command, args)?;
    if !output.status.success() {
        return Err(failure(command, args, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub(crate) fn failure(command: &str, args: &[String], output: &Output) -> SysError {
    SysError::CommandFailed {
        command: render(command, args),
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn formats_command_context() {
        let args = vec!["-a".to_string(), "-f".to_string(), "/dev/sdb".to_string()];
        assert_eq!(render("wipefs", &args), "wipefs -a -f /dev/sdb");
        assert_eq!(render("lsblk", &[]), "lsblk");
    }
}
