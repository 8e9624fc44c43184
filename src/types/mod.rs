// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources served by the operator.

pub mod platform;
pub mod tracker;

pub use platform::PlatformInit;
pub use tracker::{FeatureTracker, Source, SourceType};
