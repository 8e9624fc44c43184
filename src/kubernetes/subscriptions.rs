// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Operator Lifecycle Manager subscription lookups

use crate::error::Result;
use crate::kubernetes::dynamic::api_resource;
use kube::{
    api::{DynamicObject, ListParams},
    Api, Client, ResourceExt,
};
use tracing::debug;

const SUBSCRIPTION_API_VERSION: &str = "operators.coreos.com/v1alpha1";
const SUBSCRIPTION_KIND: &str = "Subscription";

/// Find the namespace of the subscription with the given name, searching all namespaces
pub async fn find_subscription(client: &Client, name: &str) -> Result<Option<String>> {
    let ar = api_resource(SUBSCRIPTION_API_VERSION, SUBSCRIPTION_KIND);
    let subscriptions: Api<DynamicObject> = Api::all_with(client.clone(), &ar);

    let found = subscriptions
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .find(|s| s.name_any() == name)
        .map(|s| s.namespace().unwrap_or_default());

    debug!("Subscription {} found in {:?}", name, found);
    Ok(found)
}
