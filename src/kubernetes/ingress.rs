// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! OpenShift ingress controller lookups

use crate::error::{OperatorError, Result};
use crate::kubernetes::dynamic::api_resource;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{DynamicObject, ListParams},
    Api, Client, ResourceExt,
};
use tracing::debug;

const INGRESS_CONTROLLER_API_VERSION: &str = "operator.openshift.io/v1";
const INGRESS_CONTROLLER_KIND: &str = "IngressController";
pub const INGRESS_OPERATOR_NAMESPACE: &str = "openshift-ingress-operator";
/// Namespace the router reads its certificate secrets from
pub const INGRESS_NAMESPACE: &str = "openshift-ingress";

fn is_available(controller: &DynamicObject) -> bool {
    controller.data["status"]["conditions"]
        .as_array()
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c["type"] == "Available" && c["status"] == "True")
        })
}

/// First ingress controller reporting `Available=True`
pub async fn find_available_ingress_controller(client: &Client) -> Result<Option<DynamicObject>> {
    let ar = api_resource(INGRESS_CONTROLLER_API_VERSION, INGRESS_CONTROLLER_KIND);
    let controllers: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), INGRESS_OPERATOR_NAMESPACE, &ar);

    Ok(controllers
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .find(is_available))
}

/// Name of the secret holding the controller's default certificate
pub fn default_certificate_secret_name(controller: &DynamicObject) -> String {
    controller.data["spec"]["defaultCertificate"]["name"]
        .as_str()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("router-certs-{}", controller.name_any()))
}

/// The certificate secret served by the available ingress controller
pub async fn default_ingress_certificate(client: &Client) -> Result<Secret> {
    let controller = find_available_ingress_controller(client)
        .await?
        .ok_or_else(|| OperatorError::ConditionNotMet("no available ingress controller".to_string()))?;
    let name = default_certificate_secret_name(&controller);
    debug!(
        "Ingress controller {} serves certificate {}/{}",
        controller.name_any(),
        INGRESS_NAMESPACE,
        name
    );

    let secrets: Api<Secret> = Api::namespaced(client.clone(), INGRESS_NAMESPACE);
    Ok(secrets.get(&name).await?)
}
