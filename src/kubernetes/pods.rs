// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod readiness checks

use crate::error::{OperatorError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{api::ListParams, Api, Client, ResourceExt};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

/// A pod counts as settled when it is Ready, finished successfully, or was evicted.
pub fn is_pod_settled(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };

    match status.phase.as_deref() {
        Some("Succeeded") => return true,
        Some("Failed") if status.reason.as_deref() == Some("Evicted") => return true,
        _ => {}
    }

    status.conditions.as_ref().is_some_and(|conditions| {
        conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True")
    })
}

/// List pods in a namespace and report whether all of them are settled
pub async fn pods_ready(client: &Client, namespace: &str, selector: Option<&str>) -> Result<bool> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let mut params = ListParams::default();
    if let Some(selector) = selector {
        params = params.labels(selector);
    }

    let pod_list = pods.list(&params).await?;
    let pending: Vec<String> = pod_list
        .items
        .iter()
        .filter(|p| !is_pod_settled(p))
        .map(|p| p.name_any())
        .collect();

    if !pending.is_empty() {
        debug!("Pods not ready in {}: {:?}", namespace, pending);
    }

    Ok(pending.is_empty())
}

/// Poll until all pods in a namespace are settled, failing once `timeout` elapses
#[instrument(skip(client))]
pub async fn wait_for_pods_ready(
    client: &Client,
    namespace: &str,
    selector: Option<&str>,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        if pods_ready(client, namespace, selector).await? {
            info!("All pods in {} are ready", namespace);
            return Ok(());
        }

        if Instant::now() + interval > deadline {
            return Err(OperatorError::Timeout(format!(
                "pods in namespace {} not ready after {:?}",
                namespace, timeout
            )));
        }

        sleep(interval).await;
    }
}
