// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pre- and post-condition functions and the built-in checks.

use super::data::FeatureContext;
use crate::error::{OperatorError, Result};
use crate::kubernetes::{crd_exists, ensure_namespace_exists, find_subscription, wait_for_pods_ready};
use futures::future::BoxFuture;
use futures::FutureExt;
use kube::Client;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type CheckFn =
    Arc<dyn Fn(Client, Arc<FeatureContext>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named check run before or after a feature's resources are applied
#[derive(Clone)]
pub struct Condition {
    pub name: String,
    check: CheckFn,
}

impl Condition {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Client, Arc<FeatureContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |client, ctx| check(client, ctx).boxed()),
        }
    }

    pub async fn check(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<()> {
        (self.check)(client.clone(), ctx.clone()).await
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition").field("name", &self.name).finish()
    }
}

/// Create the namespace when it does not exist yet
pub fn ensure_namespace(namespace: impl Into<String>) -> Condition {
    let namespace = namespace.into();
    Condition::new(format!("ensure-namespace-{}", namespace), move |client, _| {
        let namespace = namespace.clone();
        async move { ensure_namespace_exists(&client, &namespace).await.map(|_| ()) }
    })
}

/// Create the feature's target namespace when it does not exist yet
pub fn ensure_target_namespace() -> Condition {
    Condition::new("ensure-target-namespace", |client, ctx: Arc<FeatureContext>| async move {
        ensure_namespace_exists(&client, &ctx.info().target_namespace)
            .await
            .map(|_| ())
    })
}

/// Require a CustomResourceDefinition named `<plural>.<group>`
pub fn crd_installed(name: impl Into<String>) -> Condition {
    let name = name.into();
    Condition::new(format!("crd-installed-{}", name), move |client, _| {
        let name = name.clone();
        async move {
            if crd_exists(&client, &name).await? {
                Ok(())
            } else {
                Err(OperatorError::ConditionNotMet(format!(
                    "CRD {} is not installed",
                    name
                )))
            }
        }
    })
}

/// Require an OLM subscription with the given name in any namespace
pub fn subscription_present(name: impl Into<String>) -> Condition {
    let name = name.into();
    Condition::new(format!("subscription-present-{}", name), move |client, _| {
        let name = name.clone();
        async move {
            match find_subscription(&client, &name).await? {
                Some(_) => Ok(()),
                None => Err(OperatorError::ConditionNotMet(format!(
                    "subscription {} not found; install the operator first",
                    name
                ))),
            }
        }
    })
}

/// Wait until every pod in `namespace` is ready, succeeded or evicted
pub fn pods_ready(namespace: impl Into<String>, interval: Duration, timeout: Duration) -> Condition {
    let namespace = namespace.into();
    Condition::new(format!("pods-ready-{}", namespace), move |client, _| {
        let namespace = namespace.clone();
        async move { wait_for_pods_ready(&client, &namespace, None, interval, timeout).await }
    })
}

/// Wait until every pod in the feature's target namespace is settled
pub fn target_pods_ready(interval: Duration, timeout: Duration) -> Condition {
    Condition::new("target-pods-ready", move |client, ctx: Arc<FeatureContext>| async move {
        wait_for_pods_ready(
            &client,
            &ctx.info().target_namespace,
            None,
            interval,
            timeout,
        )
        .await
    })
}
