// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use datasci_operator::config::Config;
use datasci_operator::kubernetes::wait_for_crd;
use datasci_operator::reconcilers::PlatformInitReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting datasci operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: applications_namespace={}, manifests_dir={:?}, managed_features={}",
        config.applications_namespace, config.manifests_dir, config.managed_features
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Trackers must be served before any feature can be applied
    info!("Waiting for FeatureTracker CRD to become available...");
    wait_for_crd(&client, "features.datasci.io", "v1", "FeatureTracker").await?;

    let reconciler = PlatformInitReconciler::new(client, config);
    let shutdown = reconciler.shutdown_token();

    info!("Starting reconciler...");
    tokio::select! {
        res = reconciler.run() => {
            res?;
            warn!("Reconciler stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, cancelling in-flight features");
            shutdown.cancel();
        }
    }

    Ok(())
}
