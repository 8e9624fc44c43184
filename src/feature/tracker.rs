// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! FeatureTracker lifecycle: creation, status updates and removal.

use super::data::FeatureInfo;
use crate::error::{OperatorError, Result};
use crate::types::tracker::{tracker_name, FeatureTracker, FeatureTrackerSpec, FeatureTrackerStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{DeleteParams, Patch, PatchParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

fn has_owner(tracker: &FeatureTracker, owner: &OwnerReference) -> bool {
    tracker.owner_references().iter().any(|r| r.uid == owner.uid)
}

/// Create the tracker for a feature or bring its spec and owner up to date
#[instrument(skip(client, owner), fields(feature = %info.name, namespace = %info.target_namespace))]
pub async fn ensure(
    client: &Client,
    info: &FeatureInfo,
    owner: Option<&OwnerReference>,
    retries: u32,
) -> Result<FeatureTracker> {
    let trackers: Api<FeatureTracker> = Api::all(client.clone());
    let name = tracker_name(&info.target_namespace, &info.name);
    let spec = FeatureTrackerSpec {
        source: info.source.clone(),
        app_namespace: info.target_namespace.clone(),
    };

    for _ in 0..retries.max(1) {
        let result = match trackers.get_opt(&name).await? {
            None => {
                let mut tracker = FeatureTracker::new(&name, spec.clone());
                if let Some(owner) = owner {
                    tracker.metadata.owner_references = Some(vec![owner.clone()]);
                }
                info!("Creating FeatureTracker {}", name);
                trackers
                    .create(&PostParams::default(), &tracker)
                    .await
                    .map_err(OperatorError::from)
            }
            Some(existing)
                if existing.spec == spec && owner.is_none_or(|o| has_owner(&existing, o)) =>
            {
                return Ok(existing);
            }
            Some(mut existing) => {
                existing.spec = spec.clone();
                if let Some(owner) = owner.filter(|o| !has_owner(&existing, o)) {
                    existing.owner_references_mut().push(owner.clone());
                }
                debug!("Updating FeatureTracker {}", name);
                trackers
                    .replace(&name, &PostParams::default(), &existing)
                    .await
                    .map_err(OperatorError::from)
            }
        };

        match result {
            Ok(tracker) => return Ok(tracker),
            Err(e) if e.is_conflict() => debug!("Conflict writing FeatureTracker {}, retrying", name),
            Err(e) => return Err(e),
        }
    }

    Err(OperatorError::TrackerConflict(name))
}

pub async fn fetch(client: &Client, name: &str) -> Result<FeatureTracker> {
    let trackers: Api<FeatureTracker> = Api::all(client.clone());
    trackers
        .get_opt(name)
        .await?
        .ok_or_else(|| OperatorError::TrackerNotFound(name.to_string()))
}

/// Read-modify-write the tracker status, retrying on conflicting writes.
/// Nothing is written when the mutation leaves the status unchanged.
pub async fn update_status<F>(
    client: &Client,
    name: &str,
    retries: u32,
    mut mutate: F,
) -> Result<FeatureTracker>
where
    F: FnMut(&mut FeatureTrackerStatus),
{
    let trackers: Api<FeatureTracker> = Api::all(client.clone());

    for attempt in 1..=retries.max(1) {
        let tracker = fetch(client, name).await?;
        let mut status = tracker.status.clone().unwrap_or_default();
        mutate(&mut status);

        if tracker.status.as_ref() == Some(&status) {
            debug!("Status of FeatureTracker {} unchanged", name);
            return Ok(tracker);
        }

        let patch = json!({
            "metadata": { "resourceVersion": tracker.resource_version() },
            "status": status,
        });

        match trackers
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(OperatorError::from)
        {
            Ok(updated) => return Ok(updated),
            Err(e) if e.is_conflict() => {
                debug!(
                    "Conflict updating status of FeatureTracker {} (attempt {}/{})",
                    name, attempt, retries
                );
            }
            Err(e) => return Err(e),
        }
    }

    warn!("Giving up updating status of FeatureTracker {}", name);
    Err(OperatorError::TrackerConflict(name.to_string()))
}

/// Delete a tracker. Owned resources follow through garbage collection.
/// Returns false when the tracker was already gone.
pub async fn remove(client: &Client, name: &str) -> Result<bool> {
    let trackers: Api<FeatureTracker> = Api::all(client.clone());

    match trackers
        .delete(name, &DeleteParams::background())
        .await
        .map_err(OperatorError::from)
    {
        Ok(_) => {
            info!("Deleted FeatureTracker {}", name);
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            debug!("FeatureTracker {} already removed", name);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Owner reference pointing at a persisted tracker
pub fn owner_reference(tracker: &FeatureTracker) -> Result<OwnerReference> {
    tracker
        .owner_ref(&())
        .ok_or_else(|| OperatorError::TrackerNotFound(tracker.name_any()))
}
