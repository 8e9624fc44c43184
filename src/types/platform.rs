// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster initialization resource: owns cluster-level features and the
/// per-component feature sets.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(group = "platform.datasci.io", version = "v1", kind = "PlatformInit")]
#[kube(status = "PlatformInitStatus")]
#[serde(rename_all = "camelCase")]
pub struct PlatformInitSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_namespace: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,
    #[serde(default)]
    pub management_state: ManagementState,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ManagementState {
    #[default]
    Managed,
    Removed,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInitStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PlatformInit {
    /// Namespace for platform features, falling back to the operator default
    pub fn applications_namespace<'a>(&'a self, default: &'a str) -> &'a str {
        self.spec
            .applications_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default)
    }

    /// Management state of a component; unlisted components are removed
    pub fn component_state(&self, name: &str) -> ManagementState {
        self.spec
            .components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.management_state)
            .unwrap_or(ManagementState::Removed)
    }
}
