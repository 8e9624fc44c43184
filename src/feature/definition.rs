// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Declarative description of a feature, validated into a [`Feature`](super::Feature).

use super::conditions::Condition;
use super::data::{DataBinding, FeatureContext, BUILTIN_BINDINGS};
use super::manifest::ManifestRef;
use super::resources::{CleanupHook, ResourceMutator};
use crate::constants::tracker::STATUS_UPDATE_RETRIES;
use crate::error::{OperatorError, Result};
use crate::types::Source;
use futures::future::BoxFuture;
use futures::FutureExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Client;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type EnabledFn =
    Arc<dyn Fn(Client, Arc<FeatureContext>) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Predicate deciding whether a feature should exist on the cluster
#[derive(Clone)]
pub struct EnabledWhen(EnabledFn);

impl EnabledWhen {
    pub fn new<F, Fut>(predicate: F) -> Self
    where
        F: Fn(Client, Arc<FeatureContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        Self(Arc::new(move |client, ctx| predicate(client, ctx).boxed()))
    }

    pub async fn evaluate(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<bool> {
        (self.0)(client.clone(), ctx.clone()).await
    }
}

impl fmt::Debug for EnabledWhen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnabledWhen")
    }
}

/// Everything needed to build a feature. Fields left empty fall back to
/// defaults; `target_namespace` must be set, either here or by the registry.
#[derive(Clone, Debug)]
pub struct FeatureDefinition {
    pub name: String,
    /// Provenance recorded on the tracker; defaults to an unknown source named after the feature
    pub source: Option<Source>,
    pub target_namespace: Option<String>,
    pub manifests: Vec<ManifestRef>,
    pub data: Vec<DataBinding>,
    pub preconditions: Vec<Condition>,
    pub postconditions: Vec<Condition>,
    pub resources: Vec<ResourceMutator>,
    pub cleanups: Vec<CleanupHook>,
    pub enabled_when: Option<EnabledWhen>,
    /// Correct drift on every rendered object that does not opt out
    pub managed: bool,
    /// Owner of the tracker itself
    pub owner: Option<OwnerReference>,
    pub tracker_status_retries: u32,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            target_namespace: None,
            manifests: Vec::new(),
            data: Vec::new(),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            resources: Vec::new(),
            cleanups: Vec::new(),
            enabled_when: None,
            managed: false,
            owner: None,
            tracker_status_retries: STATUS_UPDATE_RETRIES,
        }
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OperatorError::InvalidDefinition(
                "feature name must not be empty".to_string(),
            ));
        }

        if self
            .target_namespace
            .as_deref()
            .is_none_or(|ns| ns.trim().is_empty())
        {
            return Err(OperatorError::InvalidDefinition(format!(
                "target namespace for '{}' feature is not defined",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for binding in &self.data {
            if BUILTIN_BINDINGS.contains(&binding.name.as_str()) {
                return Err(OperatorError::InvalidDefinition(format!(
                    "feature '{}' rebinds built-in data '{}'",
                    self.name, binding.name
                )));
            }
            if !seen.insert(binding.name.as_str()) {
                return Err(OperatorError::InvalidDefinition(format!(
                    "feature '{}' binds data '{}' more than once",
                    self.name, binding.name
                )));
            }
        }

        Ok(())
    }
}
