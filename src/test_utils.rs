// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Kubernetes API server behind a `tower::Service`.
//!
//! Objects are stored as JSON keyed by their URL. Create, get, list (with
//! equality label selectors), replace, merge/apply patches, status
//! subresources, optimistic concurrency on `resourceVersion` and
//! owner-reference cascading deletes are supported, which is enough to drive
//! a real `kube::Client` through the feature engine.

use crate::kubernetes::dynamic::api_resource;
use http::{header::CONTENT_TYPE, request::Parts, Method, Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    prefix: String,
    plural: String,
    namespace: Option<String>,
    name: String,
}

enum Target {
    Collection {
        prefix: String,
        plural: String,
        namespace: Option<String>,
    },
    Item {
        key: ObjectKey,
        status: bool,
    },
}

struct Failure {
    method: Method,
    path_fragment: String,
    code: u16,
    /// Requests left to fail; `None` fails forever
    remaining: Option<u32>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    counter: u64,
    failures: Vec<Failure>,
    status_conflicts: u32,
    requests: Vec<(Method, String)>,
}

impl State {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn stamp_new(&mut self, key: &ObjectKey, obj: &mut Value) {
        let id = self.next();
        let meta = &mut obj["metadata"];
        meta["name"] = json!(key.name);
        if let Some(ns) = &key.namespace {
            meta["namespace"] = json!(ns);
        }
        if meta.get("uid").and_then(Value::as_str).is_none() {
            meta["uid"] = json!(format!("uid-{}", id));
        }
        meta["resourceVersion"] = json!(id.to_string());
    }

    fn bump(&mut self, obj: &mut Value) {
        let id = self.next();
        obj["metadata"]["resourceVersion"] = json!(id.to_string());
    }

    fn failure_for(&mut self, method: &Method, path: &str) -> Option<u16> {
        let failure = self.failures.iter_mut().find(|f| {
            &f.method == method && path.contains(&f.path_fragment) && f.remaining != Some(0)
        })?;
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(failure.code)
    }

    fn delete_cascading(&mut self, key: &ObjectKey) {
        let mut pending: Vec<String> = Vec::new();
        if let Some(removed) = self.objects.remove(key) {
            if let Some(uid) = removed["metadata"]["uid"].as_str() {
                pending.push(uid.to_string());
            }
        }

        while let Some(owner_uid) = pending.pop() {
            let dependents: Vec<ObjectKey> = self
                .objects
                .iter()
                .filter(|(_, v)| is_owned_by(v, &owner_uid))
                .map(|(k, _)| k.clone())
                .collect();

            for dependent in dependents {
                if let Some(removed) = self.objects.remove(&dependent) {
                    if let Some(uid) = removed["metadata"]["uid"].as_str() {
                        pending.push(uid.to_string());
                    }
                }
            }
        }
    }
}

fn is_owned_by(obj: &Value, owner_uid: &str) -> bool {
    obj["metadata"]["ownerReferences"]
        .as_array()
        .is_some_and(|refs| refs.iter().any(|r| r["uid"] == owner_uid))
}

/// A fake API server that keeps objects in memory.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a kube Client talking to this server
    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }

    /// Store an object as if it had been created through the API
    pub fn seed(&self, mut obj: Value) -> Value {
        let key = key_for(&obj);
        let mut state = self.state.lock().unwrap();
        state.stamp_new(&key, &mut obj);
        state.objects.insert(key, obj.clone());
        obj
    }

    pub fn get(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<Value> {
        let key = object_key(api_version, kind, namespace, name);
        self.state.lock().unwrap().objects.get(&key).cloned()
    }

    pub fn exists(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> bool {
        self.get(api_version, kind, namespace, name).is_some()
    }

    /// Mutate a stored object out of band, like another client would
    pub fn mutate(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        f: impl FnOnce(&mut Value),
    ) {
        let key = object_key(api_version, kind, namespace, name);
        let mut state = self.state.lock().unwrap();
        let mut obj = state.objects.get(&key).cloned().expect("object to mutate");
        f(&mut obj);
        state.bump(&mut obj);
        state.objects.insert(key, obj);
    }

    /// Remove an object, cascading to everything it owns
    pub fn remove(&self, api_version: &str, kind: &str, namespace: Option<&str>, name: &str) {
        let key = object_key(api_version, kind, namespace, name);
        self.state.lock().unwrap().delete_cascading(&key);
    }

    /// All stored objects of a kind
    pub fn list(&self, api_version: &str, kind: &str) -> Vec<Value> {
        let ar = api_resource(api_version, kind);
        let prefix = prefix_for(&ar.group, &ar.version);
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|(k, _)| k.prefix == prefix && k.plural == ar.plural)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Answer requests whose path contains `path_fragment` with an error code
    pub fn fail_on(&self, method: Method, path_fragment: &str, code: u16) {
        self.state.lock().unwrap().failures.push(Failure {
            method,
            path_fragment: path_fragment.to_string(),
            code,
            remaining: None,
        });
    }

    /// Like [`fail_on`](Self::fail_on), for the next `times` matching requests only
    pub fn fail_times(&self, method: Method, path_fragment: &str, code: u16, times: u32) {
        self.state.lock().unwrap().failures.push(Failure {
            method,
            path_fragment: path_fragment.to_string(),
            code,
            remaining: Some(times),
        });
    }

    /// Reject the next `n` status updates with 409 Conflict
    pub fn conflict_status_updates(&self, n: u32) {
        self.state.lock().unwrap().status_conflicts = n;
    }

    /// Number of requests seen for a method on paths containing `path_fragment`
    pub fn request_count(&self, method: Method, path_fragment: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, p)| *m == method && p.contains(path_fragment))
            .count()
    }

    fn handle(&self, parts: &Parts, body: &[u8]) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();
        let path = parts.uri.path().to_string();
        state.requests.push((parts.method.clone(), path.clone()));

        if let Some(code) = state.failure_for(&parts.method, &path) {
            return (code, status_json(code, "InternalError", "injected failure"));
        }

        let Some(target) = parse_path(&path) else {
            return not_found(&path);
        };

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match (parts.method.clone(), target) {
            (Method::GET, Target::Item { key, .. }) => match state.objects.get(&key) {
                Some(obj) => (200, obj.clone()),
                None => not_found(&key.name),
            },
            (
                Method::GET,
                Target::Collection {
                    prefix,
                    plural,
                    namespace,
                },
            ) => {
                let selector = label_selector(parts.uri.query());
                let items: Vec<Value> = state
                    .objects
                    .iter()
                    .filter(|(k, _)| k.prefix == prefix && k.plural == plural)
                    .filter(|(k, _)| namespace.is_none() || k.namespace == namespace)
                    .filter(|(_, v)| matches_labels(v, &selector))
                    .map(|(_, v)| v.clone())
                    .collect();
                (
                    200,
                    json!({
                        "apiVersion": "v1",
                        "kind": "List",
                        "metadata": { "resourceVersion": "" },
                        "items": items,
                    }),
                )
            }
            (
                Method::POST,
                Target::Collection {
                    prefix,
                    plural,
                    namespace,
                },
            ) => {
                let Ok(mut obj) = serde_json::from_slice::<Value>(body) else {
                    return bad_request("invalid body");
                };
                let Some(name) = obj["metadata"]["name"].as_str().map(str::to_string) else {
                    return bad_request("name is required");
                };
                let key = ObjectKey {
                    prefix,
                    plural,
                    namespace,
                    name,
                };
                if state.objects.contains_key(&key) {
                    return (409, status_json(409, "AlreadyExists", "already exists"));
                }
                state.stamp_new(&key, &mut obj);
                state.objects.insert(key, obj.clone());
                (201, obj)
            }
            (Method::PUT, Target::Item { key, status }) => {
                let Ok(obj) = serde_json::from_slice::<Value>(body) else {
                    return bad_request("invalid body");
                };
                let Some(stored) = state.objects.get(&key).cloned() else {
                    return not_found(&key.name);
                };
                if version_conflicts(&stored, &obj) {
                    return (409, status_json(409, "Conflict", "resourceVersion mismatch"));
                }
                let mut updated = if status {
                    let mut s = stored.clone();
                    s["status"] = obj["status"].clone();
                    s
                } else {
                    let mut o = obj;
                    o["metadata"]["uid"] = stored["metadata"]["uid"].clone();
                    if let Some(existing_status) = stored.get("status") {
                        o["status"] = existing_status.clone();
                    }
                    o
                };
                state.bump(&mut updated);
                state.objects.insert(key, updated.clone());
                (200, updated)
            }
            (Method::PATCH, Target::Item { key, status }) => {
                let Ok(mut patch) = serde_json::from_slice::<Value>(body) else {
                    return bad_request("invalid body");
                };
                if status && state.status_conflicts > 0 {
                    state.status_conflicts -= 1;
                    return (409, status_json(409, "Conflict", "injected conflict"));
                }
                let stored = state.objects.get(&key).cloned();
                let is_apply = content_type.starts_with("application/apply-patch");
                let mut updated = match stored {
                    Some(stored) => {
                        if !is_apply && version_conflicts(&stored, &patch) {
                            return (409, status_json(409, "Conflict", "resourceVersion mismatch"));
                        }
                        if let Some(meta) = patch.get_mut("metadata").and_then(Value::as_object_mut) {
                            meta.remove("resourceVersion");
                        }
                        let mut merged = stored;
                        if status {
                            merge_json(&mut merged["status"], &patch["status"]);
                        } else {
                            merge_json(&mut merged, &patch);
                        }
                        merged
                    }
                    None if is_apply && !status => {
                        state.stamp_new(&key, &mut patch);
                        state.objects.insert(key, patch.clone());
                        return (201, patch);
                    }
                    None => return not_found(&key.name),
                };
                state.bump(&mut updated);
                state.objects.insert(key, updated.clone());
                (200, updated)
            }
            (Method::DELETE, Target::Item { key, .. }) => {
                if !state.objects.contains_key(&key) {
                    return not_found(&key.name);
                }
                state.delete_cascading(&key);
                (
                    200,
                    json!({
                        "kind": "Status",
                        "apiVersion": "v1",
                        "metadata": {},
                        "status": "Success",
                        "code": 200
                    }),
                )
            }
            _ => (
                405,
                status_json(405, "MethodNotAllowed", "method not allowed"),
            ),
        }
    }
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await?.to_bytes();
            let (status, payload) = server.handle(&parts, &bytes);

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string().into_bytes()))
                .unwrap())
        })
    }
}

fn prefix_for(group: &str, version: &str) -> String {
    if group.is_empty() {
        format!("/api/{}", version)
    } else {
        format!("/apis/{}/{}", group, version)
    }
}

fn object_key(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> ObjectKey {
    let ar = api_resource(api_version, kind);
    ObjectKey {
        prefix: prefix_for(&ar.group, &ar.version),
        plural: ar.plural,
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
    }
}

fn key_for(obj: &Value) -> ObjectKey {
    object_key(
        obj["apiVersion"].as_str().expect("apiVersion"),
        obj["kind"].as_str().expect("kind"),
        obj["metadata"]["namespace"].as_str(),
        obj["metadata"]["name"].as_str().expect("name"),
    )
}

fn parse_path(path: &str) -> Option<Target> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (prefix, rest) = match segments.as_slice() {
        ["api", version, rest @ ..] => (format!("/api/{}", version), rest),
        ["apis", group, version, rest @ ..] => (format!("/apis/{}/{}", group, version), rest),
        _ => return None,
    };

    let item = |plural: &str, namespace: Option<&str>, name: &str, status: bool| Target::Item {
        key: ObjectKey {
            prefix: prefix.clone(),
            plural: plural.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        },
        status,
    };

    match rest {
        ["namespaces", ns, plural] => Some(Target::Collection {
            prefix: prefix.clone(),
            plural: plural.to_string(),
            namespace: Some(ns.to_string()),
        }),
        ["namespaces", ns, plural, name] => Some(item(plural, Some(*ns), name, false)),
        ["namespaces", ns, plural, name, "status"] => Some(item(plural, Some(*ns), name, true)),
        [plural] => Some(Target::Collection {
            prefix: prefix.clone(),
            plural: plural.to_string(),
            namespace: None,
        }),
        [plural, name] => Some(item(plural, None, name, false)),
        [plural, name, "status"] => Some(item(plural, None, name, true)),
        _ => None,
    }
}

fn label_selector(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query else {
        return Vec::new();
    };

    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k == "labelSelector")
        .flat_map(|(_, v)| {
            v.split(',')
                .filter_map(|term| term.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.trim_start_matches('=').trim().to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn matches_labels(obj: &Value, selector: &[(String, String)]) -> bool {
    selector
        .iter()
        .all(|(k, v)| obj["metadata"]["labels"][k].as_str() == Some(v.as_str()))
}

fn version_conflicts(stored: &Value, incoming: &Value) -> bool {
    match incoming["metadata"]["resourceVersion"].as_str() {
        Some(rv) if !rv.is_empty() => stored["metadata"]["resourceVersion"].as_str() != Some(rv),
        _ => false,
    }
}

/// JSON merge patch (RFC 7386)
fn merge_json(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = json!({});
            }
            if let Value::Object(map) = target {
                for (k, v) in entries {
                    if v.is_null() {
                        map.remove(k);
                    } else {
                        merge_json(map.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

fn status_json(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

fn not_found(name: &str) -> (u16, Value) {
    (
        404,
        status_json(404, "NotFound", &format!("\"{}\" not found", name)),
    )
}

fn bad_request(message: &str) -> (u16, Value) {
    (400, status_json(400, "BadRequest", message))
}

/// Poll until `check` holds, giving up after roughly a second
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Create a namespace JSON object
pub fn namespace_json(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name }
    })
}

/// Create a CustomResourceDefinition JSON object
pub fn crd_json(name: &str) -> Value {
    let (plural, group) = name.split_once('.').expect("plural.group");
    json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": name },
        "spec": {
            "group": group,
            "names": { "plural": plural, "kind": "Thing" },
            "scope": "Namespaced",
            "versions": []
        }
    })
}

/// Create an OLM Subscription JSON object
pub fn subscription_json(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": "operators.coreos.com/v1alpha1",
        "kind": "Subscription",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "name": name, "channel": "stable" }
    })
}

/// Create an OpenShift IngressController JSON object
pub fn ingress_controller_json(name: &str, available: bool, default_certificate: Option<&str>) -> Value {
    let mut controller = json!({
        "apiVersion": "operator.openshift.io/v1",
        "kind": "IngressController",
        "metadata": { "name": name, "namespace": "openshift-ingress-operator" },
        "spec": {},
        "status": {
            "conditions": [{
                "type": "Available",
                "status": if available { "True" } else { "False" }
            }]
        }
    });
    if let Some(secret) = default_certificate {
        controller["spec"]["defaultCertificate"] = json!({ "name": secret });
    }
    controller
}

/// Create a TLS Secret JSON object; `cert` is the base64 encoded certificate
pub fn secret_json(namespace: &str, name: &str, cert: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "type": "kubernetes.io/tls",
        "data": { "tls.crt": cert, "tls.key": "a2V5" }
    })
}

/// Create a Pod JSON object with the given phase and readiness
pub fn pod_json(
    namespace: &str,
    name: &str,
    phase: &str,
    ready: bool,
    reason: Option<&str>,
) -> Value {
    let mut pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app": "workload" }
        },
        "spec": { "containers": [{ "name": "main", "image": "busybox" }] },
        "status": {
            "phase": phase,
            "conditions": [{
                "type": "Ready",
                "status": if ready { "True" } else { "False" }
            }]
        }
    });
    if let Some(reason) = reason {
        pod["status"]["reason"] = json!(reason);
    }
    pod
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;
    use kube::api::{DeleteParams, ListParams, PostParams};
    use kube::Api;

    #[test]
    fn test_parse_path_namespaced_item_and_status() {
        match parse_path("/api/v1/namespaces/ns/services/svc") {
            Some(Target::Item { key, status }) => {
                assert_eq!(key.prefix, "/api/v1");
                assert_eq!(key.plural, "services");
                assert_eq!(key.namespace.as_deref(), Some("ns"));
                assert_eq!(key.name, "svc");
                assert!(!status);
            }
            _ => panic!("expected item"),
        }

        assert!(matches!(
            parse_path("/apis/features.datasci.io/v1/featuretrackers/ns-x/status"),
            Some(Target::Item { status: true, .. })
        ));
    }

    #[test]
    fn test_parse_path_namespace_object_is_item() {
        match parse_path("/api/v1/namespaces/foo") {
            Some(Target::Item { key, .. }) => {
                assert_eq!(key.plural, "namespaces");
                assert_eq!(key.name, "foo");
                assert!(key.namespace.is_none());
            }
            _ => panic!("expected item"),
        }
    }

    #[test]
    fn test_merge_json_removes_nulls_and_merges_objects() {
        let mut target = json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge_json(&mut target, &json!({"a": {"b": 5, "c": null}, "e": [1]}));
        assert_eq!(target, json!({"a": {"b": 5}, "d": 3, "e": [1]}));
    }

    #[test]
    fn test_label_selector_decodes_query() {
        let selector = label_selector(Some("labelSelector=app%3Dworkload%2Ctier%3Dweb"));
        assert_eq!(
            selector,
            vec![
                ("app".to_string(), "workload".to_string()),
                ("tier".to_string(), "web".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_create_get_delete_through_client() {
        let server = FakeApiServer::new();
        let namespaces: Api<Namespace> = Api::all(server.client());

        let ns: Namespace = serde_json::from_value(namespace_json("apps")).unwrap();
        let created = namespaces.create(&PostParams::default(), &ns).await.unwrap();
        assert!(created.metadata.uid.is_some());

        let listed = namespaces.list(&ListParams::default()).await.unwrap();
        assert_eq!(listed.items.len(), 1);

        namespaces
            .delete("apps", &DeleteParams::default())
            .await
            .unwrap();
        assert!(namespaces.get_opt("apps").await.unwrap().is_none());
    }

    #[test]
    fn test_delete_cascades_to_owned_objects() {
        let server = FakeApiServer::new();
        let owner = server.seed(namespace_json("owner"));
        let owner_uid = owner["metadata"]["uid"].as_str().unwrap().to_string();

        server.seed(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "child",
                "namespace": "ns",
                "ownerReferences": [{
                    "apiVersion": "v1", "kind": "Namespace", "name": "owner", "uid": owner_uid
                }]
            }
        }));

        server.remove("v1", "Namespace", None, "owner");

        assert!(!server.exists("v1", "ConfigMap", Some("ns"), "child"));
    }
}
