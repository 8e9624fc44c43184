// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Programmatic resources and cleanup hooks for features.
//!
//! Mutators produce objects that cannot be expressed as manifests, such as
//! generated certificates. Their output joins the rendered objects and goes
//! through the same applier, so it is owned by the feature's tracker.

use super::data::FeatureContext;
use crate::constants::annotations;
use crate::error::{OperatorError, Result};
use crate::kubernetes::default_ingress_certificate;
use futures::future::BoxFuture;
use futures::FutureExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{DynamicObject, ObjectMeta};
use kube::{Api, Client, ResourceExt};
use rcgen::{CertificateParams, DnType, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type BuildFn = Arc<
    dyn Fn(Client, Arc<FeatureContext>) -> BoxFuture<'static, Result<Vec<DynamicObject>>>
        + Send
        + Sync,
>;

/// A named step that builds objects in code
#[derive(Clone)]
pub struct ResourceMutator {
    pub name: String,
    build: BuildFn,
}

impl ResourceMutator {
    pub fn new<F, Fut>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(Client, Arc<FeatureContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<DynamicObject>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(move |client, ctx| build(client, ctx).boxed()),
        }
    }

    pub async fn build(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<Vec<DynamicObject>> {
        (self.build)(client.clone(), ctx.clone()).await
    }
}

impl fmt::Debug for ResourceMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMutator").field("name", &self.name).finish()
    }
}

type CleanupFn =
    Arc<dyn Fn(Client, Arc<FeatureContext>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Extra work run when a feature is cleaned up, before its tracker is removed
#[derive(Clone)]
pub struct CleanupHook {
    pub name: String,
    run: CleanupFn,
}

impl CleanupHook {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Client, Arc<FeatureContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move |client, ctx| run(client, ctx).boxed()),
        }
    }

    pub async fn run(&self, client: &Client, ctx: &Arc<FeatureContext>) -> Result<()> {
        (self.run)(client.clone(), ctx.clone()).await
    }
}

impl fmt::Debug for CleanupHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHook").field("name", &self.name).finish()
    }
}

fn to_dynamic<K: Serialize>(resource: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(resource)?)?)
}

/// PEM encoded certificate and private key
pub struct GeneratedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generate a self-signed certificate for `domain`.
/// A wildcard domain also covers its base domain; `localhost` is always included.
pub fn generate_certificate(domain: &str) -> Result<GeneratedCertificate> {
    let err = |e: rcgen::Error| OperatorError::CertificateError(e.to_string());

    let mut names = Vec::new();
    if let Some(base) = domain.strip_prefix("*.") {
        names.push(base.to_string());
    }
    names.push(domain.to_string());
    names.push("localhost".to_string());

    let key_pair = KeyPair::generate().map_err(err)?;
    let mut params = CertificateParams::new(names).map_err(err)?;
    params.distinguished_name.push(DnType::CommonName, domain);
    params
        .distinguished_name
        .push(DnType::OrganizationName, "datasci-self-signed");

    let cert = params.self_signed(&key_pair).map_err(err)?;

    Ok(GeneratedCertificate {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

async fn self_signed_secret(
    ctx: &FeatureContext,
    secret_name: String,
    domain_binding: &str,
    namespace: Option<String>,
) -> Result<Vec<DynamicObject>> {
    let domain = ctx.string(domain_binding).await?;
    let namespace = namespace.unwrap_or_else(|| ctx.info().target_namespace.clone());
    debug!(
        "Generating self-signed certificate for {} into {}/{}",
        domain, namespace, secret_name
    );
    let generated = generate_certificate(&domain)?;

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name),
            namespace: Some(namespace),
            annotations: Some(BTreeMap::from([(
                annotations::MANAGED.to_string(),
                "false".to_string(),
            )])),
            ..Default::default()
        },
        type_: Some("kubernetes.io/tls".to_string()),
        string_data: Some(BTreeMap::from([
            ("tls.crt".to_string(), generated.cert_pem),
            ("tls.key".to_string(), generated.key_pem),
        ])),
        ..Default::default()
    };

    Ok(vec![to_dynamic(&secret)?])
}

/// A TLS secret holding a self-signed certificate for the domain found in
/// the `domain_binding` data binding.
///
/// The secret is marked unmanaged so an existing certificate is never
/// regenerated on later reconciles.
pub fn self_signed_certificate(
    secret_name: impl Into<String>,
    domain_binding: impl Into<String>,
    namespace: Option<String>,
) -> ResourceMutator {
    let secret_name = secret_name.into();
    let domain_binding = domain_binding.into();

    ResourceMutator::new(
        format!("self-signed-certificate-{}", secret_name),
        move |_, ctx: Arc<FeatureContext>| {
            let secret_name = secret_name.clone();
            let domain_binding = domain_binding.clone();
            let namespace = namespace.clone();
            async move { self_signed_secret(&ctx, secret_name, &domain_binding, namespace).await }
        },
    )
}

fn is_secret_outdated(existing: &Secret, source: &Secret) -> bool {
    existing.data.clone().unwrap_or_default() != source.data.clone().unwrap_or_default()
}

async fn copied_ingress_secret(
    client: &Client,
    ctx: &FeatureContext,
    secret_name: String,
    namespace: Option<String>,
) -> Result<Vec<DynamicObject>> {
    let source = default_ingress_certificate(client).await?;
    let namespace = namespace.unwrap_or_else(|| ctx.info().target_namespace.clone());

    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    if let Some(existing) = secrets.get_opt(&secret_name).await? {
        if !is_secret_outdated(&existing, &source) {
            debug!("Certificate {}/{} is up to date", namespace, secret_name);
            return Ok(Vec::new());
        }
    }

    debug!(
        "Copying ingress certificate {} into {}/{}",
        source.name_any(),
        namespace,
        secret_name
    );
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name),
            namespace: Some(namespace),
            annotations: Some(BTreeMap::from([(
                annotations::MANAGED.to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        },
        type_: source.type_,
        data: source.data,
        ..Default::default()
    };

    Ok(vec![to_dynamic(&secret)?])
}

/// A copy of the default ingress controller's certificate secret.
///
/// The copy is only written when it is missing or its data differs from the
/// source secret.
pub fn default_ingress_certificate_copy(
    secret_name: impl Into<String>,
    namespace: Option<String>,
) -> ResourceMutator {
    let secret_name = secret_name.into();

    ResourceMutator::new(
        format!("default-ingress-certificate-{}", secret_name),
        move |client: Client, ctx: Arc<FeatureContext>| {
            let secret_name = secret_name.clone();
            let namespace = namespace.clone();
            async move { copied_ingress_secret(&client, &ctx, secret_name, namespace).await }
        },
    )
}

/// Where a feature's TLS certificate comes from
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateMode {
    SelfSigned,
    OpenshiftDefaultIngress,
    /// Supplied by the user; nothing is created
    Provided,
}

/// Certificate secret whose origin is chosen by the `mode_binding` data binding,
/// holding a [`CertificateMode`].
pub fn certificate(
    secret_name: impl Into<String>,
    mode_binding: impl Into<String>,
    domain_binding: impl Into<String>,
    namespace: Option<String>,
) -> ResourceMutator {
    let secret_name = secret_name.into();
    let mode_binding = mode_binding.into();
    let domain_binding = domain_binding.into();

    ResourceMutator::new(
        format!("certificate-{}", secret_name),
        move |client: Client, ctx: Arc<FeatureContext>| {
            let secret_name = secret_name.clone();
            let mode_binding = mode_binding.clone();
            let domain_binding = domain_binding.clone();
            let namespace = namespace.clone();
            async move {
                let mode: CertificateMode = serde_json::from_value(ctx.value(&mode_binding).await?)?;
                match mode {
                    CertificateMode::SelfSigned => {
                        self_signed_secret(&ctx, secret_name, &domain_binding, namespace).await
                    }
                    CertificateMode::OpenshiftDefaultIngress => {
                        copied_ingress_secret(&client, &ctx, secret_name, namespace).await
                    }
                    CertificateMode::Provided => Ok(Vec::new()),
                }
            }
        },
    )
}

/// A ConfigMap in the target namespace whose values come from data bindings,
/// keyed by ConfigMap entry.
pub fn config_map(name: impl Into<String>, entries: BTreeMap<String, String>) -> ResourceMutator {
    let name = name.into();

    ResourceMutator::new(format!("config-map-{}", name), move |_, ctx: Arc<FeatureContext>| {
        let name = name.clone();
        let entries = entries.clone();
        async move {
            let mut data = BTreeMap::new();
            for (key, binding) in entries {
                let value = match ctx.value(&binding).await? {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                data.insert(key, value);
            }

            let config_map = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(name),
                    namespace: Some(ctx.info().target_namespace.clone()),
                    ..Default::default()
                },
                data: Some(data),
                ..Default::default()
            };

            Ok(vec![to_dynamic(&config_map)?])
        }
    })
}
