// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    /// When "true", drift on the object is reverted to the rendered manifest on every reconcile.
    /// When "false", the object is created once and left alone.
    pub const MANAGED: &str = "datasci.io/managed";
}

/// Label keys used by the operator
pub mod labels {
    /// Set on resources rendered for a component-sourced feature
    pub const PART_OF: &str = "app.datasci.io/part-of";
}

/// The operator name used for server-side apply
pub const OPERATOR_NAME: &str = "datasci-operator";

/// Finalizer placed on PlatformInit resources
pub const PLATFORM_FINALIZER: &str = "platform.datasci.io/finalizer";

/// FeatureTracker status handling
pub mod tracker {
    /// Read-modify-write attempts before giving up on a conflicting status update
    pub const STATUS_UPDATE_RETRIES: u32 = 5;
}

/// Pod readiness polling defaults
pub mod pods {
    pub const READY_INTERVAL_SECS: u64 = 2;
    pub const READY_TIMEOUT_SECS: u64 = 300;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
