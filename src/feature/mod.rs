// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The feature engine.
//!
//! A [`Feature`] is a named bundle of cluster resources rendered from
//! manifests and data bindings. Applying it runs preconditions, renders and
//! applies its objects owned by a cluster-scoped `FeatureTracker`, runs
//! postconditions and records the outcome on the tracker status. Deleting
//! the tracker garbage-collects everything the feature created.

pub mod applier;
pub mod conditions;
pub mod data;
pub mod definition;
pub mod handler;
pub mod manifest;
pub mod resources;
pub mod template;
pub mod tracker;

pub use conditions::Condition;
pub use data::{DataBinding, FeatureContext, FeatureInfo};
pub use definition::{EnabledWhen, FeatureDefinition};
pub use handler::{ComponentFeatures, FeaturesHandler, FeaturesProvider, FeaturesRegistry};
pub use manifest::{EmbeddedBundle, ManifestRef, ManifestSource};
pub use resources::{CleanupHook, ResourceMutator};

use crate::constants::labels;
use crate::error::{OperatorError, Result};
use crate::types::tracker::{tracker_name, ConditionReason, FeatureTracker};
use crate::types::{Source, SourceType};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a feature ended a reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureOutcome {
    Applied,
    /// Disabled; its tracker and owned resources were removed
    Skipped,
}

#[derive(Debug)]
pub struct Feature {
    info: FeatureInfo,
    manifests: Vec<ManifestRef>,
    data: Vec<DataBinding>,
    preconditions: Vec<Condition>,
    postconditions: Vec<Condition>,
    resources: Vec<ResourceMutator>,
    cleanups: Vec<CleanupHook>,
    enabled_when: Option<EnabledWhen>,
    managed: bool,
    owner: Option<OwnerReference>,
    tracker_status_retries: u32,
}

/// Status reason recorded for a failed feature
pub fn failure_reason(err: &OperatorError) -> ConditionReason {
    match err {
        OperatorError::PreConditionFailed { .. } => ConditionReason::PreConditions,
        OperatorError::PostConditionFailed { .. } => ConditionReason::PostConditions,
        OperatorError::ResourceApplyFailed { .. } | OperatorError::ResourceCreationFailed { .. } => {
            ConditionReason::ResourceCreation
        }
        _ => ConditionReason::FailedApplying,
    }
}

impl Feature {
    pub fn new(definition: FeatureDefinition) -> Result<Self> {
        definition.validate()?;

        let FeatureDefinition {
            name,
            source,
            target_namespace,
            manifests,
            data,
            preconditions,
            postconditions,
            resources,
            cleanups,
            enabled_when,
            managed,
            owner,
            tracker_status_retries,
        } = definition;

        let source = source.unwrap_or_else(|| Source::new(SourceType::Unknown, name.clone()));

        Ok(Self {
            info: FeatureInfo {
                name,
                target_namespace: target_namespace.unwrap_or_default(),
                source,
            },
            manifests,
            data,
            preconditions,
            postconditions,
            resources,
            cleanups,
            enabled_when,
            managed,
            owner,
            tracker_status_retries,
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn target_namespace(&self) -> &str {
        &self.info.target_namespace
    }

    pub fn source(&self) -> &Source {
        &self.info.source
    }

    pub fn tracker_name(&self) -> String {
        tracker_name(&self.info.target_namespace, &self.info.name)
    }

    fn context(&self, client: &Client) -> Arc<FeatureContext> {
        Arc::new(FeatureContext::new(client.clone(), self.info.clone(), &self.data))
    }

    async fn is_enabled(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<bool> {
        match &self.enabled_when {
            Some(predicate) => predicate.evaluate(client, ctx).await,
            None => Ok(true),
        }
    }

    /// Apply the feature, or remove it when it is disabled
    #[instrument(skip(self, client), fields(feature = %self.info.name, namespace = %self.info.target_namespace))]
    pub async fn apply(&self, client: &Client) -> Result<FeatureOutcome> {
        let ctx = self.context(client);

        if !self.is_enabled(client, &ctx).await? {
            debug!("Feature {} is disabled", self.info.name);
            self.remove_if_present(client, &ctx).await?;
            return Ok(FeatureOutcome::Skipped);
        }

        let tracker = tracker::ensure(
            client,
            &self.info,
            self.owner.as_ref(),
            self.tracker_status_retries,
        )
        .await?;
        let name = tracker.name_any();
        tracker::update_status(client, &name, self.tracker_status_retries, |status| {
            status.mark_progressing(&self.info.name)
        })
        .await?;

        let result = self.run(client, &ctx, &tracker).await;

        let report = match &result {
            Ok(()) => {
                tracker::update_status(client, &name, self.tracker_status_retries, |status| {
                    status.mark_ready(&self.info.name)
                })
                .await
            }
            Err(err) => {
                warn!("Feature {} failed: {}", self.info.name, err);
                let reason = failure_reason(err);
                let message = err.to_string();
                tracker::update_status(client, &name, self.tracker_status_retries, |status| {
                    status.mark_failed(&self.info.name, reason, &message)
                })
                .await
            }
        };

        match (result, report) {
            (Ok(()), Ok(_)) => {
                info!("Feature {} applied", self.info.name);
                Ok(FeatureOutcome::Applied)
            }
            (Err(err), Ok(_)) | (Ok(()), Err(err)) => Err(err),
            (Err(err), Err(report_err)) => Err(OperatorError::Multiple(vec![err, report_err])),
        }
    }

    async fn run(
        &self,
        client: &Client,
        ctx: &Arc<FeatureContext>,
        tracker: &FeatureTracker,
    ) -> Result<()> {
        for condition in &self.preconditions {
            debug!("Checking precondition {}", condition.name);
            condition
                .check(client, ctx)
                .await
                .map_err(|e| OperatorError::PreConditionFailed {
                    feature: self.info.name.clone(),
                    condition: condition.name.clone(),
                    source: Box::new(e),
                })?;
        }

        let (objects, patches) =
            self.render(client, ctx)
                .await
                .map_err(|e| OperatorError::ResourceCreationFailed {
                    feature: self.info.name.clone(),
                    source: Box::new(e),
                })?;

        let owner = tracker::owner_reference(tracker)?;
        applier::apply(client, &self.info.name, &objects, &owner).await?;
        applier::patch(client, &self.info.name, &patches).await?;

        for condition in &self.postconditions {
            debug!("Checking postcondition {}", condition.name);
            condition
                .check(client, ctx)
                .await
                .map_err(|e| OperatorError::PostConditionFailed {
                    feature: self.info.name.clone(),
                    condition: condition.name.clone(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }

    /// Build the object set: mutator output first, then manifests in order.
    /// Patch manifests are returned separately.
    async fn render(
        &self,
        client: &Client,
        ctx: &Arc<FeatureContext>,
    ) -> Result<(Vec<DynamicObject>, Vec<DynamicObject>)> {
        let mut objects = Vec::new();
        for mutator in &self.resources {
            objects.extend(mutator.build(client, ctx).await?);
        }

        let data = ctx.resolve_all().await?;
        let mut patches = Vec::new();
        for reference in &self.manifests {
            for rendered in manifest::render(&reference.source, &reference.path, &data)? {
                if rendered.patch {
                    patches.extend(rendered.objects);
                } else {
                    objects.extend(rendered.objects);
                }
            }
        }

        if self.managed {
            applier::mark_managed(&mut objects);
        }

        if self.info.source.source_type == SourceType::Component {
            for obj in &mut objects {
                obj.labels_mut()
                    .insert(labels::PART_OF.to_string(), self.info.source.name.clone());
            }
        }

        Ok((objects, patches))
    }

    async fn remove_if_present(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<()> {
        match tracker::fetch(client, &self.tracker_name()).await {
            Ok(_) => {
                info!("Removing feature {}", self.info.name);
                self.cleanup_with(client, ctx).await
            }
            Err(OperatorError::TrackerNotFound(_)) => {
                debug!("Feature {} has no tracker, nothing to clean up", self.info.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run cleanup hooks then delete the tracker, collecting every failure.
    /// A feature that was never applied has no tracker and nothing to clean up.
    #[instrument(skip(self, client), fields(feature = %self.info.name, namespace = %self.info.target_namespace))]
    pub async fn cleanup(&self, client: &Client) -> Result<()> {
        let ctx = self.context(client);
        self.remove_if_present(client, &ctx).await
    }

    async fn cleanup_with(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<()> {
        let mut errors = Vec::new();

        for hook in &self.cleanups {
            if let Err(e) = hook.run(client, ctx).await {
                warn!("Cleanup {} of feature {} failed: {}", hook.name, self.info.name, e);
                errors.push(e);
            }
        }

        if let Err(e) = tracker::remove(client, &self.tracker_name()).await {
            errors.push(e);
        }

        OperatorError::aggregate(errors)
    }
}
