// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Addressing schema-less objects through the dynamic API

use crate::error::{OperatorError, Result};
use kube::{
    api::DynamicObject,
    core::GroupVersionKind,
    discovery::ApiResource,
    Api, Client, ResourceExt,
};

/// Split an apiVersion into group and version; the core group is empty
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Resolve the API resource for an apiVersion/kind pair
pub fn api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind))
}

/// Resolve the API resource of a rendered object from its type metadata
pub fn object_api_resource(obj: &DynamicObject) -> Result<ApiResource> {
    let types = obj.types.as_ref().ok_or_else(|| OperatorError::InvalidManifest {
        path: obj.name_any(),
        reason: "object has no apiVersion/kind".to_string(),
    })?;

    if types.api_version.is_empty() || types.kind.is_empty() {
        return Err(OperatorError::InvalidManifest {
            path: obj.name_any(),
            reason: "object has an empty apiVersion or kind".to_string(),
        });
    }

    Ok(api_resource(&types.api_version, &types.kind))
}

/// Build an API handle for an object. Objects carrying a namespace are
/// addressed as namespaced resources, all others as cluster-scoped.
pub fn dynamic_api(client: &Client, obj: &DynamicObject) -> Result<Api<DynamicObject>> {
    let ar = object_api_resource(obj)?;

    Ok(match obj.metadata.namespace.as_deref() {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    })
}

/// Kind of a rendered object, for logs and errors
pub fn kind_of(obj: &DynamicObject) -> String {
    obj.types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// `Kind namespace/name` description of a rendered object
pub fn describe(obj: &DynamicObject) -> String {
    match obj.metadata.namespace.as_deref() {
        Some(ns) => format!("{} {}/{}", kind_of(obj), ns, obj.name_any()),
        None => format!("{} {}", kind_of(obj), obj.name_any()),
    }
}
