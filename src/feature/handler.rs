// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Feature registries and the handlers that apply or clean them up as a batch.
//!
//! Within one handler features run in registration order and the first
//! failure stops the batch, since later features usually build on earlier
//! ones. [`ComponentFeatures`] sits one layer up and keeps going across
//! components, returning every failure together.

use super::definition::FeatureDefinition;
use super::{Feature, FeatureOutcome};
use crate::error::{OperatorError, Result};
use crate::types::platform::ManagementState;
use crate::types::{PlatformInit, Source, SourceType};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Adds feature definitions to a registry; called every time a handler runs
pub type FeaturesProvider = Arc<dyn Fn(&mut FeaturesRegistry) -> Result<()> + Send + Sync>;

/// Features collected for one owner, in registration order
pub struct FeaturesRegistry {
    source: Source,
    target_namespace: String,
    owner: Option<OwnerReference>,
    features: Vec<Feature>,
}

impl FeaturesRegistry {
    fn new(source: Source, target_namespace: String, owner: Option<OwnerReference>) -> Self {
        Self {
            source,
            target_namespace,
            owner,
            features: Vec::new(),
        }
    }

    /// Register a feature. It inherits the registry's source and owner, and
    /// its namespace unless it names one itself.
    pub fn add(&mut self, mut definition: FeatureDefinition) -> Result<()> {
        definition.source = Some(self.source.clone());
        if definition.target_namespace.is_none() {
            definition.target_namespace = Some(self.target_namespace.clone());
        }
        if definition.owner.is_none() {
            definition.owner = self.owner.clone();
        }

        let feature = Feature::new(definition)?;
        if self.features.iter().any(|f| {
            f.name() == feature.name() && f.target_namespace() == feature.target_namespace()
        }) {
            return Err(OperatorError::DuplicateFeature {
                namespace: feature.target_namespace().to_string(),
                name: feature.name().to_string(),
            });
        }

        self.features.push(feature);
        Ok(())
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

/// Applies and cleans up the features of one owner
#[derive(Clone)]
pub struct FeaturesHandler {
    source: Source,
    target_namespace: String,
    owner: Option<OwnerReference>,
    providers: Vec<FeaturesProvider>,
}

impl FeaturesHandler {
    /// Handler for platform-wide features owned by a PlatformInit
    pub fn cluster(
        platform: &PlatformInit,
        applications_namespace: impl Into<String>,
        providers: Vec<FeaturesProvider>,
    ) -> Self {
        Self {
            source: Source::new(SourceType::PlatformInit, platform.name_any()),
            target_namespace: applications_namespace.into(),
            owner: platform.owner_ref(&()),
            providers,
        }
    }

    /// Handler for one component's features. The owner becomes the
    /// controller of every tracker the handler creates.
    pub fn component(
        owner: OwnerReference,
        component: impl Into<String>,
        target_namespace: impl Into<String>,
        providers: Vec<FeaturesProvider>,
    ) -> Self {
        Self {
            source: Source::new(SourceType::Component, component),
            target_namespace: target_namespace.into(),
            owner: Some(OwnerReference {
                controller: Some(true),
                ..owner
            }),
            providers,
        }
    }

    /// Handler without features
    pub fn empty() -> Self {
        Self {
            source: Source::new(SourceType::Unknown, ""),
            target_namespace: String::new(),
            owner: None,
            providers: Vec::new(),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Build a fresh registry from the providers
    pub fn registry(&self) -> Result<FeaturesRegistry> {
        let mut registry = FeaturesRegistry::new(
            self.source.clone(),
            self.target_namespace.clone(),
            self.owner.clone(),
        );
        for provider in &self.providers {
            provider(&mut registry)?;
        }
        Ok(registry)
    }

    /// Apply every feature in order, stopping at the first failure
    #[instrument(skip(self, client, cancel), fields(source = %self.source.name))]
    pub async fn apply(&self, client: &Client, cancel: &CancellationToken) -> Result<()> {
        let registry = self.registry()?;

        for feature in registry.features() {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(OperatorError::Cancelled(feature.name().to_string()));
                }
                outcome = feature.apply(client) => outcome?,
            };
            match outcome {
                FeatureOutcome::Applied => debug!("Feature {} applied", feature.name()),
                FeatureOutcome::Skipped => debug!("Feature {} skipped", feature.name()),
            }
        }

        info!(
            "Applied {} feature(s) for {} {}",
            registry.features().len(),
            self.source.source_type,
            self.source.name
        );
        Ok(())
    }

    /// Clean up every feature, last registered first, collecting every failure
    #[instrument(skip(self, client, cancel), fields(source = %self.source.name))]
    pub async fn cleanup(&self, client: &Client, cancel: &CancellationToken) -> Result<()> {
        let registry = self.registry()?;
        let mut errors = Vec::new();

        for feature in registry.features().iter().rev() {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    errors.push(OperatorError::Cancelled(feature.name().to_string()));
                    break;
                }
                result = feature.cleanup(client) => result,
            };
            if let Err(e) = result {
                warn!("Cleanup of feature {} failed: {}", feature.name(), e);
                errors.push(e);
            }
        }

        OperatorError::aggregate(errors)
    }
}

/// Feature handlers for every component of the platform
#[derive(Clone, Default)]
pub struct ComponentFeatures {
    components: Vec<(FeaturesHandler, ManagementState)>,
}

impl ComponentFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: FeaturesHandler, state: ManagementState) {
        self.components.push((handler, state));
    }

    /// Apply managed components and clean up removed ones.
    /// A failing component does not stop the others.
    pub async fn reconcile(&self, client: &Client, cancel: &CancellationToken) -> Result<()> {
        let mut errors = Vec::new();

        for (handler, state) in &self.components {
            let result = match state {
                ManagementState::Managed => handler.apply(client, cancel).await,
                ManagementState::Removed => handler.cleanup(client, cancel).await,
            };
            if let Err(e) = result {
                warn!("Component {} failed: {}", handler.source().name, e);
                errors.push(e);
            }
        }

        OperatorError::aggregate(errors)
    }

    /// Clean up every component regardless of its state
    pub async fn cleanup(&self, client: &Client, cancel: &CancellationToken) -> Result<()> {
        let mut errors = Vec::new();
        for (handler, _) in self.components.iter().rev() {
            if let Err(e) = handler.cleanup(client, cancel).await {
                errors.push(e);
            }
        }
        OperatorError::aggregate(errors)
    }
}
