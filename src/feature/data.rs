// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Named data bindings resolved lazily once per reconcile.

use crate::error::{OperatorError, Result};
use crate::types::{Source, SourceType};
use futures::future::BoxFuture;
use futures::FutureExt;
use kube::Client;
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

pub const TARGET_NAMESPACE: &str = "TargetNamespace";
pub const SOURCE: &str = "Source";
pub const COMPONENT_NAME: &str = "ComponentName";

/// Names every feature binds on its own
pub const BUILTIN_BINDINGS: [&str; 3] = [TARGET_NAMESPACE, SOURCE, COMPONENT_NAME];

/// Identity of the feature being processed, as seen by bindings and conditions
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureInfo {
    pub name: String,
    pub target_namespace: String,
    pub source: Source,
}

type Provider = Arc<dyn Fn(Client, FeatureInfo) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A named value computed from cluster state
#[derive(Clone)]
pub struct DataBinding {
    pub name: String,
    provider: Provider,
}

impl DataBinding {
    pub fn new<F, Fut>(name: impl Into<String>, provider: F) -> Self
    where
        F: Fn(Client, FeatureInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            provider: Arc::new(move |client, info| provider(client, info).boxed()),
        }
    }

    /// A binding with a fixed value
    pub fn constant(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(name, move |_, _| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }
}

impl fmt::Debug for DataBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBinding").field("name", &self.name).finish()
    }
}

/// Per-reconcile context handed to bindings, conditions and resource mutators
pub struct FeatureContext {
    info: FeatureInfo,
    client: Client,
    bindings: Vec<(DataBinding, OnceCell<Value>)>,
}

impl FeatureContext {
    pub fn new(client: Client, info: FeatureInfo, bindings: &[DataBinding]) -> Self {
        Self {
            info,
            client,
            bindings: bindings
                .iter()
                .map(|b| (b.clone(), OnceCell::new()))
                .collect(),
        }
    }

    pub fn info(&self) -> &FeatureInfo {
        &self.info
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn builtin(&self, name: &str) -> Option<Value> {
        let source = &self.info.source;
        match name {
            TARGET_NAMESPACE => Some(json!(self.info.target_namespace)),
            SOURCE => Some(json!({
                "Type": source.source_type.to_string(),
                "Name": source.name,
            })),
            COMPONENT_NAME if source.source_type == SourceType::Component => {
                Some(json!(source.name))
            }
            _ => None,
        }
    }

    /// Value of a binding, computing it on first use
    pub async fn value(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.builtin(name) {
            return Ok(value);
        }

        let (binding, cell) = self
            .bindings
            .iter()
            .find(|(b, _)| b.name == name)
            .ok_or_else(|| OperatorError::MissingData {
                feature: self.info.name.clone(),
                name: name.to_string(),
            })?;

        let value = cell
            .get_or_try_init(|| {
                debug!("Resolving data binding {} for {}", name, self.info.name);
                (binding.provider)(self.client.clone(), self.info.clone())
            })
            .await?;
        Ok(value.clone())
    }

    /// String value of a binding
    pub async fn string(&self, name: &str) -> Result<String> {
        match self.value(name).await? {
            Value::String(s) => Ok(s),
            other => Err(OperatorError::InvalidDefinition(format!(
                "data binding '{}' of feature {} is not a string: {}",
                name, self.info.name, other
            ))),
        }
    }

    /// Resolve every binding into the map used for template rendering
    pub async fn resolve_all(&self) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for name in BUILTIN_BINDINGS {
            if let Some(value) = self.builtin(name) {
                data.insert(name.to_string(), value);
            }
        }
        for (binding, _) in &self.bindings {
            data.insert(binding.name.clone(), self.value(&binding.name).await?);
        }
        Ok(data)
    }
}
