// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster-scoped record of a Feature: provenance, target namespace and status.
/// Every resource a Feature applies is owned by its tracker.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(group = "features.datasci.io", version = "v1", kind = "FeatureTracker")]
#[kube(status = "FeatureTrackerStatus")]
#[serde(rename_all = "camelCase")]
pub struct FeatureTrackerSpec {
    pub source: Source,
    pub app_namespace: String,
}

/// Kind of resource that requested a feature
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum SourceType {
    PlatformInit,
    Component,
    Unknown,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::PlatformInit => "PlatformInit",
            SourceType::Component => "Component",
            SourceType::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
}

impl Source {
    pub fn new(source_type: SourceType, name: impl Into<String>) -> Self {
        Self {
            source_type,
            name: name.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum Phase {
    Progressing,
    Ready,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    Available,
    Progressing,
    Degraded,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Step of the feature pipeline a condition refers to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionReason {
    FeatureCreated,
    PreConditions,
    PostConditions,
    ResourceCreation,
    FailedApplying,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackerCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: ConditionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTrackerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub conditions: Vec<TrackerCondition>,
}

impl FeatureTrackerStatus {
    pub fn condition(&self, condition_type: ConditionType) -> Option<&TrackerCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Insert or replace the condition of the given type
    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
    ) {
        let condition = TrackerCondition {
            condition_type,
            status,
            reason,
            message: Some(message.into()),
        };

        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    pub fn mark_progressing(&mut self, feature: &str) {
        self.phase = Some(Phase::Progressing);
        self.set_condition(
            ConditionType::Progressing,
            ConditionStatus::True,
            ConditionReason::FeatureCreated,
            format!("Applying feature [{}]", feature),
        );
    }

    pub fn mark_ready(&mut self, feature: &str) {
        let message = format!("Applied feature [{}] successfully", feature);
        self.phase = Some(Phase::Ready);
        self.set_condition(
            ConditionType::Available,
            ConditionStatus::True,
            ConditionReason::FeatureCreated,
            message.clone(),
        );
        self.set_condition(
            ConditionType::Progressing,
            ConditionStatus::False,
            ConditionReason::FeatureCreated,
            message.clone(),
        );
        self.set_condition(
            ConditionType::Degraded,
            ConditionStatus::False,
            ConditionReason::FeatureCreated,
            message,
        );
    }

    pub fn mark_failed(&mut self, feature: &str, reason: ConditionReason, error: &str) {
        let message = format!("Failed applying [{}]: {}", feature, error);
        self.phase = Some(Phase::Error);
        self.set_condition(
            ConditionType::Available,
            ConditionStatus::False,
            reason,
            message.clone(),
        );
        self.set_condition(
            ConditionType::Progressing,
            ConditionStatus::False,
            reason,
            message.clone(),
        );
        self.set_condition(ConditionType::Degraded, ConditionStatus::True, reason, message);
    }
}

/// Trackers are named `<namespace>-<featureName>`
pub fn tracker_name(namespace: &str, feature: &str) -> String {
    format!("{}-{}", namespace, feature)
}
