// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{pods, tracker};

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace platform features are rendered into when a PlatformInit does not name one
    pub applications_namespace: String,
    /// Root directory holding one sub-directory of manifests per platform feature
    pub manifests_dir: Option<PathBuf>,
    /// Whether features loaded from `manifests_dir` correct drift on their resources
    pub managed_features: bool,
    /// Attempts for a FeatureTracker status read-modify-write before giving up
    pub tracker_status_retries: u32,
    /// How long features loaded from `manifests_dir` wait for their pods
    pub pod_ready_timeout: Duration,
    pub pod_ready_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let applications_namespace = env::var("APPLICATIONS_NAMESPACE")
            .context("APPLICATIONS_NAMESPACE environment variable not set")?;
        let manifests_dir = env::var("MANIFESTS_DIR").ok().map(PathBuf::from);
        let managed_features = parse_bool(env::var("MANAGED_FEATURES").ok(), true)
            .context("MANAGED_FEATURES must be 'true' or 'false'")?;
        let tracker_status_retries = parse_number(
            env::var("TRACKER_STATUS_RETRIES").ok(),
            tracker::STATUS_UPDATE_RETRIES,
        )
        .context("TRACKER_STATUS_RETRIES must be a number")?;
        let pod_ready_timeout = parse_number(
            env::var("POD_READY_TIMEOUT_SECS").ok(),
            pods::READY_TIMEOUT_SECS,
        )
        .context("POD_READY_TIMEOUT_SECS must be a number of seconds")?;
        let pod_ready_interval = parse_number(
            env::var("POD_READY_INTERVAL_SECS").ok(),
            pods::READY_INTERVAL_SECS,
        )
        .context("POD_READY_INTERVAL_SECS must be a number of seconds")?;

        Ok(Config {
            applications_namespace,
            manifests_dir,
            managed_features,
            tracker_status_retries,
            pod_ready_timeout: Duration::from_secs(pod_ready_timeout),
            pod_ready_interval: Duration::from_secs(pod_ready_interval),
        })
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value {
        None => Ok(default),
        Some(v) => Ok(v.trim().parse()?),
    }
}

fn parse_number<T>(value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        None => Ok(default),
        Some(v) => Ok(v.trim().parse()?),
    }
}
