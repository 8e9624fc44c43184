// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Create, correct or leave alone rendered objects according to the managed annotation.

use crate::constants::{annotations, OPERATOR_NAME};
use crate::error::{OperatorError, Result};
use crate::kubernetes::dynamic::{describe, dynamic_api, kind_of};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

fn managed_annotation(obj: &DynamicObject) -> Option<&str> {
    obj.annotations().get(annotations::MANAGED).map(String::as_str)
}

/// Whether an existing object should be brought back to its rendered state.
/// An explicit annotation on the live object wins over the rendered one.
pub fn is_managed(existing: &DynamicObject, desired: &DynamicObject) -> bool {
    match managed_annotation(existing) {
        Some("false") => false,
        Some("true") => true,
        _ => managed_annotation(desired) == Some("true"),
    }
}

/// Mark objects as managed unless their manifest already decides
pub fn mark_managed(objects: &mut [DynamicObject]) {
    for obj in objects {
        obj.annotations_mut()
            .entry(annotations::MANAGED.to_string())
            .or_insert_with(|| "true".to_string());
    }
}

fn add_owner(obj: &mut DynamicObject, owner: &OwnerReference) {
    let refs = obj.owner_references_mut();
    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner.clone());
    }
}

fn apply_failed(feature: &str, obj: &DynamicObject, source: OperatorError) -> OperatorError {
    OperatorError::ResourceApplyFailed {
        feature: feature.to_string(),
        kind: kind_of(obj),
        name: obj.name_any(),
        source: Box::new(source),
    }
}

/// Apply objects in order, owned by `owner`. The first failure aborts the rest.
pub async fn apply(
    client: &Client,
    feature: &str,
    objects: &[DynamicObject],
    owner: &OwnerReference,
) -> Result<()> {
    for obj in objects {
        let mut desired = obj.clone();
        add_owner(&mut desired, owner);
        apply_one(client, &desired)
            .await
            .map_err(|e| apply_failed(feature, obj, e))?;
    }
    Ok(())
}

async fn apply_one(client: &Client, desired: &DynamicObject) -> Result<()> {
    let api = dynamic_api(client, desired)?;
    let name = desired.name_any();

    let Some(existing) = api.get_opt(&name).await? else {
        api.create(&PostParams::default(), desired).await?;
        info!("Created {}", describe(desired));
        return Ok(());
    };

    if !is_managed(&existing, desired) {
        debug!("{} exists and is not managed, leaving it alone", describe(desired));
        return Ok(());
    }

    let mut desired = desired.clone();
    desired
        .annotations_mut()
        .insert(annotations::MANAGED.to_string(), "true".to_string());
    let params = PatchParams::apply(OPERATOR_NAME).force();
    api.patch(&name, &params, &Patch::Apply(&desired)).await?;
    debug!("Reconciled {} to its rendered state", describe(&desired));
    Ok(())
}

/// Merge-patch objects that must already exist
pub async fn patch(client: &Client, feature: &str, objects: &[DynamicObject]) -> Result<()> {
    for obj in objects {
        patch_one(client, obj)
            .await
            .map_err(|e| apply_failed(feature, obj, e))?;
        info!("Patched {}", describe(obj));
    }
    Ok(())
}

async fn patch_one(client: &Client, obj: &DynamicObject) -> Result<()> {
    let api = dynamic_api(client, obj)?;
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(obj))
        .await?;
    Ok(())
}
