// SPDX-License-Identifier: GPL-3.0-only

//! Daemon configuration from flags and the pod environment

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use storage_sys::{DEFAULT_SYMLINK_ROOT, HostPaths};

/// Default minimum time a device must be visible before it is claimed.
pub const DEFAULT_DEVICE_MIN_AGE: &str = "60s";

#[derive(Debug, Clone, Args)]
pub struct DaemonConfig {
    /// Node this daemon runs on
    #[arg(long, env = "MY_NODE_NAME")]
    pub node_name: String,

    /// Namespaces watched for owner declarations, comma separated; empty watches all
    #[arg(long = "watch-namespace", env = "WATCH_NAMESPACE", default_value = "")]
    pub watch_namespace: String,

    /// Root directory holding the per storage class symlink directories
    #[arg(long, env = "LOCAL_DISK_LOCATION", default_value = DEFAULT_SYMLINK_ROOT)]
    pub symlink_root: PathBuf,

    #[arg(long, env = "DISKMAKER_IMAGE")]
    pub diskmaker_image: Option<String>,

    #[arg(long, env = "PROVISIONER_IMAGE")]
    pub provisioner_image: Option<String>,

    /// Minimum time a newly observed device is left alone
    #[arg(long, env = "DEVICE_MIN_AGE", default_value = DEFAULT_DEVICE_MIN_AGE, value_parser = parse_duration)]
    pub device_min_age: Duration,
}

impl DaemonConfig {
    pub fn namespaces(&self) -> Vec<String> {
        self.watch_namespace
            .split(',')
            .map(str::trim)
            .filter(|namespace| !namespace.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            node_name: self.node_name.clone(),
            symlink_root: self.symlink_root.clone(),
            device_min_age: self.device_min_age,
            host_paths: HostPaths::default(),
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

/// Static settings shared by every reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub node_name: String,
    pub symlink_root: PathBuf,
    pub device_min_age: Duration,
    pub host_paths: HostPaths,
}

impl Settings {
    pub fn new(node_name: impl Into<String>, symlink_root: impl Into<PathBuf>) -> Self {
        Self {
            node_name: node_name.into(),
            symlink_root: symlink_root.into(),
            device_min_age: Duration::from_secs(60),
            host_paths: HostPaths::default(),
        }
    }

    pub fn with_device_min_age(mut self, device_min_age: Duration) -> Self {
        self.device_min_age = device_min_age;
        self
    }

    pub fn with_host_paths(mut self, host_paths: HostPaths) -> Self {
        self.host_paths = host_paths;
        self
    }

    pub fn class_dir(&self, storage_class: &str) -> PathBuf {
        self.symlink_root.join(storage_class)
    }
}
