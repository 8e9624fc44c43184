// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, dynamic objects, namespaces, pods, ingress and subscriptions.

pub mod crd;
pub mod dynamic;
pub mod ingress;
pub mod namespaces;
pub mod pods;
pub mod subscriptions;

pub use crd::{crd_exists, wait_for_crd};
pub use ingress::default_ingress_certificate;
pub use namespaces::ensure_namespace_exists;
pub use pods::wait_for_pods_ready;
pub use subscriptions::find_subscription;
