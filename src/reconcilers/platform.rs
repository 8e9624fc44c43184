// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! PlatformInit reconciler - applies cluster-level and per-component features.
//!
//! Features are discovered from the manifests directory:
//!
//! ```text
//! <root>/platform/<feature>/...               cluster-level features
//! <root>/components/<component>/<feature>/... features of one component
//! ```
//!
//! Components listed as `Managed` on the PlatformInit are applied, all other
//! components found on disk are cleaned up.

use crate::config::Config;
use crate::constants::PLATFORM_FINALIZER;
use crate::error::{OperatorError, Result};
use crate::feature::{
    conditions, ComponentFeatures, FeatureDefinition, FeaturesHandler, FeaturesProvider,
    ManifestRef, ManifestSource,
};
use crate::kubernetes::ensure_namespace_exists;
use crate::types::tracker::FeatureTracker;
use crate::types::PlatformInit;
use futures::{Stream, StreamExt};
use kube::{
    api::{Patch, PatchParams},
    runtime::{
        controller::Action,
        finalizer::{finalizer, Error as FinalizerError, Event},
        Controller,
    },
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher::{self, watcher, Config as WatcherConfig};
use kube_runtime::{predicates, Predicate, WatchStreamExt};
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PLATFORM_DIR: &str = "platform";
const COMPONENTS_DIR: &str = "components";

/// Sorted names of the directories directly below `path`; empty when it does not exist
fn subdirectories(path: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(OperatorError::ManifestNotFound(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

/// Registers one feature per sub-directory of `root/dir`, named after the sub-directory
pub fn directory_features(
    root: PathBuf,
    dir: String,
    managed: bool,
    tracker_status_retries: u32,
    wait_for_pods: Option<(Duration, Duration)>,
) -> FeaturesProvider {
    Arc::new(move |registry| {
        for name in subdirectories(&root.join(&dir))? {
            let mut definition = FeatureDefinition::new(name.clone());
            definition.manifests = vec![ManifestRef::new(
                ManifestSource::Directory(root.clone()),
                format!("{}/{}", dir, name),
            )];
            definition.managed = managed;
            definition.tracker_status_retries = tracker_status_retries;
            definition.preconditions = vec![conditions::ensure_target_namespace()];
            if let Some((interval, timeout)) = wait_for_pods {
                definition.postconditions = vec![conditions::target_pods_ready(interval, timeout)];
            }
            registry.add(definition)?;
        }
        Ok(())
    })
}

/// Pass on tracker events only when the spec generation or the labels change.
/// Status writes do not bump the generation, so applying a feature does not requeue its owner.
fn tracker_triggers<S>(
    trackers: S,
) -> impl Stream<Item = std::result::Result<FeatureTracker, watcher::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<FeatureTracker, watcher::Error>> + Send + 'static,
{
    trackers.predicate_filter(
        predicates::generation::<FeatureTracker>.combine(predicates::labels::<FeatureTracker>),
    )
}

pub struct PlatformInitReconciler {
    client: Client,
    config: Config,
    cluster_providers: Vec<FeaturesProvider>,
    components: Vec<(String, Vec<FeaturesProvider>)>,
    shutdown: CancellationToken,
}

impl PlatformInitReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        Self {
            client,
            config,
            cluster_providers: Vec::new(),
            components: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Add cluster-level features on top of the ones found on disk
    pub fn with_cluster_features(mut self, provider: FeaturesProvider) -> Self {
        self.cluster_providers.push(provider);
        self
    }

    /// Add features for a component on top of the ones found on disk
    pub fn with_component_features(mut self, component: impl Into<String>, provider: FeaturesProvider) -> Self {
        let component = component.into();
        match self.components.iter_mut().find(|(name, _)| *name == component) {
            Some((_, providers)) => providers.push(provider),
            None => self.components.push((component, vec![provider])),
        }
        self
    }

    /// Token cancelled when the operator shuts down; aborts in-flight feature work
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let platforms: Api<PlatformInit> = Api::all(self.client.clone());
        let trackers: Api<FeatureTracker> = Api::all(self.client.clone());
        let context = Arc::new(self);

        let tracker_changes =
            tracker_triggers(watcher(trackers, WatcherConfig::default()).touched_objects());

        Controller::new(platforms, WatcherConfig::default())
            .owns_stream(tracker_changes)
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled PlatformInit: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn cluster_handler(&self, platform: &PlatformInit, namespace: &str) -> FeaturesHandler {
        let mut providers = self.cluster_providers.clone();
        if let Some(root) = &self.config.manifests_dir {
            providers.push(directory_features(
                root.clone(),
                PLATFORM_DIR.to_string(),
                self.config.managed_features,
                self.config.tracker_status_retries,
                None,
            ));
        }
        FeaturesHandler::cluster(platform, namespace, providers)
    }

    fn component_features(&self, platform: &PlatformInit, namespace: &str) -> Result<ComponentFeatures> {
        let mut names: BTreeSet<String> = self.components.iter().map(|(n, _)| n.clone()).collect();
        names.extend(platform.spec.components.iter().map(|c| c.name.clone()));
        if let Some(root) = &self.config.manifests_dir {
            names.extend(subdirectories(&root.join(COMPONENTS_DIR))?);
        }

        let owner = platform.owner_ref(&()).ok_or_else(|| {
            OperatorError::InvalidDefinition(format!(
                "PlatformInit {} has no uid",
                platform.name_any()
            ))
        })?;

        let mut components = ComponentFeatures::new();
        for name in names {
            let mut providers = self
                .components
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, p)| p.clone())
                .unwrap_or_default();
            if let Some(root) = &self.config.manifests_dir {
                providers.push(directory_features(
                    root.clone(),
                    format!("{}/{}", COMPONENTS_DIR, name),
                    self.config.managed_features,
                    self.config.tracker_status_retries,
                    Some((self.config.pod_ready_interval, self.config.pod_ready_timeout)),
                ));
            }
            let state = platform.component_state(&name);
            components.add(
                FeaturesHandler::component(owner.clone(), name, namespace, providers),
                state,
            );
        }
        Ok(components)
    }

    /// Apply cluster features, then every component; failures from both are reported together
    pub async fn apply(&self, platform: &PlatformInit) -> Result<Action> {
        let namespace = platform
            .applications_namespace(&self.config.applications_namespace)
            .to_string();
        info!(
            "Reconciling PlatformInit {} into namespace {}",
            platform.name_any(),
            namespace
        );

        let cancel = self.shutdown.child_token();
        let mut errors = Vec::new();

        if let Err(e) = ensure_namespace_exists(&self.client, &namespace).await {
            errors.push(e);
        } else {
            if let Err(e) = self
                .cluster_handler(platform, &namespace)
                .apply(&self.client, &cancel)
                .await
            {
                errors.push(e);
            }
            let components = self.component_features(platform, &namespace);
            match components {
                Ok(components) => {
                    if let Err(e) = components.reconcile(&self.client, &cancel).await {
                        errors.push(e);
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        let result = OperatorError::aggregate(errors);
        let status = match &result {
            Ok(()) => json!({ "phase": "Ready", "message": null }),
            Err(e) => json!({ "phase": "Error", "message": e.to_string() }),
        };
        self.patch_status(platform, status).await?;

        result.map(|_| Action::requeue(Duration::from_secs(300)))
    }

    /// Remove every feature the platform owns
    pub async fn cleanup(&self, platform: &PlatformInit) -> Result<Action> {
        let namespace = platform
            .applications_namespace(&self.config.applications_namespace)
            .to_string();
        info!("Cleaning up features of PlatformInit {}", platform.name_any());

        let cancel = self.shutdown.child_token();
        let mut errors = Vec::new();

        match self.component_features(platform, &namespace) {
            Ok(components) => {
                if let Err(e) = components.cleanup(&self.client, &cancel).await {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }
        if let Err(e) = self
            .cluster_handler(platform, &namespace)
            .cleanup(&self.client, &cancel)
            .await
        {
            errors.push(e);
        }

        OperatorError::aggregate(errors)?;
        Ok(Action::await_change())
    }

    async fn patch_status(&self, platform: &PlatformInit, status: serde_json::Value) -> Result<()> {
        let platforms: Api<PlatformInit> = Api::all(self.client.clone());
        platforms
            .patch_status(
                &platform.name_any(),
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": status })),
            )
            .await?;
        Ok(())
    }
}

async fn reconcile(platform: Arc<PlatformInit>, ctx: Arc<PlatformInitReconciler>) -> Result<Action> {
    let platforms: Api<PlatformInit> = Api::all(ctx.client.clone());

    finalizer(&platforms, PLATFORM_FINALIZER, platform, |event| async {
        match event {
            Event::Apply(platform) => ctx.apply(&platform).await,
            Event::Cleanup(platform) => ctx.cleanup(&platform).await,
        }
    })
    .await
    .map_err(|e| match e {
        FinalizerError::ApplyFailed(e) | FinalizerError::CleanupFailed(e) => e,
        other => OperatorError::FinalizerError(other.to_string()),
    })
}

fn error_policy(
    platform: Arc<PlatformInit>,
    error: &OperatorError,
    _ctx: Arc<PlatformInitReconciler>,
) -> Action {
    error!(
        "Reconciliation of PlatformInit {} failed: {}",
        platform.name_any(),
        error
    );
    Action::requeue(Duration::from_secs(60))
}
