// SPDX-License-Identifier: GPL-3.0-only

//! Local storage diskmaker - node daemon publishing local block devices as
//! persistent volumes

use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use storage_diskmaker::adapters::build_default_adapters;
use storage_diskmaker::{DaemonConfig, DaemonContext, controller};

#[derive(Debug, Parser)]
#[command(name = "diskmaker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile LocalVolume and LocalVolumeSet owners on this node
    LvManager(DaemonConfig),

    /// Device discovery; reported by a separate component
    Discover(DaemonConfig),
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storage_diskmaker=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::LvManager(config) => run_lv_manager(config).await,
        Command::Discover(config) => {
            tracing::info!(
                node = %config.node_name,
                "device discovery results are published by a separate component, nothing to do"
            );
            Ok(())
        }
    }
}

async fn run_lv_manager(config: DaemonConfig) -> Result<()> {
    tracing::info!(
        "Starting local storage diskmaker v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!(
        node = %config.node_name,
        symlink_root = %config.symlink_root.display(),
        diskmaker_image = config.diskmaker_image.as_deref().unwrap_or("<unset>"),
        provisioner_image = config.provisioner_image.as_deref().unwrap_or("<unset>"),
        device_min_age = %humantime::format_duration(config.device_min_age),
        "configuration"
    );

    // Device locks and wipes need root
    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("diskmaker must run as root");
        anyhow::bail!("diskmaker must run with root privileges");
    }

    let client = kube::Client::try_default().await?;
    let settings = config.settings();
    let collaborators = build_default_adapters(client.clone(), &settings);
    let daemon = Arc::new(DaemonContext::new(settings, collaborators));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            return;
        }
        signal.cancel();
    });

    controller::run(client, daemon, config.namespaces(), shutdown).await?;
    tracing::info!("diskmaker stopped");
    Ok(())
}
