// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Template error in {path}: {reason}")]
    TemplateError { path: String, reason: String },

    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Feature {feature}: precondition '{condition}' failed: {source}")]
    PreConditionFailed {
        feature: String,
        condition: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("Feature {feature}: postcondition '{condition}' failed: {source}")]
    PostConditionFailed {
        feature: String,
        condition: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("Feature {feature}: failed applying {kind} '{name}': {source}")]
    ResourceApplyFailed {
        feature: String,
        kind: String,
        name: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("Feature {feature}: failed preparing resources: {source}")]
    ResourceCreationFailed {
        feature: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("Conflict updating FeatureTracker {0}, retries exhausted")]
    TrackerConflict(String),

    #[error("FeatureTracker {0} not found")]
    TrackerNotFound(String),

    #[error("Feature {name} already registered for namespace {namespace}")]
    DuplicateFeature { namespace: String, name: String },

    #[error("Invalid feature definition: {0}")]
    InvalidDefinition(String),

    #[error("Feature {feature} has no data binding named '{name}'")]
    MissingData { feature: String, name: String },

    #[error("Condition not met: {0}")]
    ConditionNotMet(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled while processing feature {0}")]
    Cancelled(String),

    #[error("Namespace creation failed: {0}")]
    NamespaceError(String),

    #[error("Certificate generation failed: {0}")]
    CertificateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Finalizer error: {0}")]
    FinalizerError(String),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<OperatorError>),
}

fn join_errors(errors: &[OperatorError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl OperatorError {
    /// Collapse a list of errors, `Ok` when empty and the bare error when alone.
    pub fn aggregate(mut errors: Vec<OperatorError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(OperatorError::Multiple(errors)),
        }
    }

    /// True for 404 responses from the API server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::KubeError(kube::Error::Api(e)) if e.code == 404)
            || matches!(self, OperatorError::TrackerNotFound(_))
    }

    /// True for 409 responses from the API server.
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::KubeError(kube::Error::Api(e)) if e.code == 409)
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
