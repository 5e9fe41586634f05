//! Object merge rules
//!
//! Before an operator-rendered object replaces the live one, fields that the
//! API server or other controllers own are carried over from the current
//! object so the update neither fails nor fights them.

use crate::error::{Error, Result};
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Annotation the deployment controller maintains
pub const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

const ADMISSION_GROUP: &str = "admissionregistration.k8s.io";

/// (group, kind) of an object, group empty for the core API
fn group_kind(obj: &DynamicObject) -> (&str, &str) {
    match &obj.types {
        Some(types) => {
            let group = match types.api_version.split_once('/') {
                Some((group, _)) => group,
                None => "",
            };
            (group, types.kind.as_str())
        }
        None => ("", ""),
    }
}

fn malformed(obj: &DynamicObject, reason: impl Into<String>) -> Error {
    Error::MalformedObject {
        kind: group_kind(obj).1.to_string(),
        reason: reason.into(),
    }
}

/// Top-level fields of an object, creating the map for an empty object
fn fields_mut(obj: &mut DynamicObject) -> Result<&mut Map<String, Value>> {
    let kind = group_kind(obj).1.to_string();
    if obj.data.is_null() {
        obj.data = Value::Object(Map::new());
    }
    match &mut obj.data {
        Value::Object(map) => Ok(map),
        _ => Err(Error::MalformedObject {
            kind,
            reason: "object body is not a map".into(),
        }),
    }
}

/// Child map under `key`, created when missing
fn child_map<'a>(parent: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

// =============================================================================
// Entry points
// =============================================================================

/// Produce the object to write in place of `current`.
///
/// Applies the kind-specific rules, then unions annotations and labels
/// (desired wins) and carries over the resource version. Applying it to its
/// own output changes nothing.
pub fn prepare_update(current: &DynamicObject, desired: &DynamicObject) -> Result<DynamicObject> {
    let mut updated = desired.clone();

    match group_kind(desired) {
        ("apps", "Deployment") => merge_deployment(current, &mut updated),
        ("", "Service") => merge_service(current, &mut updated)?,
        ("", "ServiceAccount") => merge_service_account(current, &mut updated)?,
        (ADMISSION_GROUP, "ValidatingWebhookConfiguration")
        | (ADMISSION_GROUP, "MutatingWebhookConfiguration") => merge_webhooks(current, &mut updated)?,
        _ => {}
    }

    merge_metadata(current, &mut updated);
    updated.metadata.resource_version = current.metadata.resource_version.clone();

    debug!(
        "Prepared update for {:?} {}",
        group_kind(&updated),
        updated.metadata.name.as_deref().unwrap_or_default()
    );
    Ok(updated)
}

/// Refuse objects the operator must never create.
///
/// ServiceAccounts listing secrets would leak token references the operator
/// does not own.
pub fn is_object_supported(object: &DynamicObject) -> Result<()> {
    if group_kind(object) == ("", "ServiceAccount") {
        let has_secrets = object
            .data
            .get("secrets")
            .and_then(Value::as_array)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if has_secrets {
            return Err(Error::UnsupportedObject(
                "cannot create ServiceAccount with secrets".into(),
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Kind rules
// =============================================================================

fn merge_deployment(current: &DynamicObject, updated: &mut DynamicObject) {
    let revision = current
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(DEPLOYMENT_REVISION_ANNOTATION));

    if let Some(revision) = revision {
        updated
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .entry(DEPLOYMENT_REVISION_ANNOTATION.to_string())
            .or_insert_with(|| revision.clone());
    }
}

fn merge_service(current: &DynamicObject, updated: &mut DynamicObject) -> Result<()> {
    let cluster_ip = current.data.get("spec").and_then(|s| s.get("clusterIP"));
    let Some(cluster_ip) = non_empty_str(cluster_ip).map(str::to_string) else {
        return Ok(());
    };

    let kind = group_kind(updated).1.to_string();
    let fields = fields_mut(updated)?;
    let Some(spec) = child_map(fields, "spec") else {
        return Err(Error::MalformedObject {
            kind,
            reason: "spec is not a map".into(),
        });
    };
    if non_empty_str(spec.get("clusterIP")).is_none() {
        spec.insert("clusterIP".into(), Value::String(cluster_ip));
    }
    Ok(())
}

fn merge_service_account(current: &DynamicObject, updated: &mut DynamicObject) -> Result<()> {
    for key in ["secrets", "imagePullSecrets"] {
        match current.data.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                let items = Value::Array(items.clone());
                fields_mut(updated)?.insert(key.to_string(), items);
            }
            Some(_) => return Err(malformed(current, format!("{} is not a list", key))),
        }
    }
    Ok(())
}

fn merge_webhooks(current: &DynamicObject, updated: &mut DynamicObject) -> Result<()> {
    let Some(current_hooks) = current.data.get("webhooks").and_then(Value::as_array) else {
        return Ok(());
    };

    let mut bundles = BTreeMap::new();
    for hook in current_hooks {
        let name = hook.get("name").and_then(Value::as_str);
        let bundle = non_empty_str(hook.get("clientConfig").and_then(|c| c.get("caBundle")));
        if let (Some(name), Some(bundle)) = (name, bundle) {
            bundles.insert(name.to_string(), bundle.to_string());
        }
    }

    let kind = group_kind(updated).1.to_string();
    let fields = fields_mut(updated)?;
    let hooks = match fields.get_mut("webhooks") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Array(hooks)) => hooks,
        Some(_) => {
            return Err(Error::MalformedObject {
                kind,
                reason: "webhooks is not a list".into(),
            })
        }
    };

    for hook in hooks.iter_mut() {
        let Some(hook) = hook.as_object_mut() else {
            return Err(Error::MalformedObject {
                kind,
                reason: "webhook entry is not a map".into(),
            });
        };

        let client_config = hook.get("clientConfig");
        match client_config.and_then(|c| c.get("caBundle")) {
            None | Some(Value::Null) => {}
            Some(Value::String(bundle)) if !bundle.is_empty() => continue,
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(Error::MalformedObject {
                    kind,
                    reason: "caBundle is not a string".into(),
                })
            }
        }

        let Some(name) = hook.get("name").and_then(Value::as_str).map(str::to_string) else {
            return Err(Error::MalformedObject {
                kind,
                reason: "webhook name not found".into(),
            });
        };

        if let Some(bundle) = bundles.get(&name) {
            let Some(client_config) = child_map(hook, "clientConfig") else {
                return Err(Error::MalformedObject {
                    kind,
                    reason: format!("clientConfig of webhook {} is not a map", name),
                });
            };
            client_config.insert("caBundle".into(), Value::String(bundle.clone()));
        }
    }
    Ok(())
}

fn union(current: &Option<BTreeMap<String, String>>, desired: &mut Option<BTreeMap<String, String>>) {
    let mut merged = current.clone().unwrap_or_default();
    if let Some(wanted) = desired.as_ref() {
        merged.extend(wanted.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if !merged.is_empty() {
        *desired = Some(merged);
    }
}

fn merge_metadata(current: &DynamicObject, updated: &mut DynamicObject) {
    union(&current.metadata.annotations, &mut updated.metadata.annotations);
    union(&current.metadata.labels, &mut updated.metadata.labels);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_webhook_ca_bundle_preserved() {
        let current = object(json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "MutatingWebhookConfiguration",
            "metadata": { "name": "sriov", "resourceVersion": "42" },
            "webhooks": [
                { "name": "a", "clientConfig": { "caBundle": "Y2VydA==" } },
                { "name": "b", "clientConfig": { "caBundle": "b2xk" } }
            ]
        }));
        let desired = object(json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "MutatingWebhookConfiguration",
            "metadata": { "name": "sriov" },
            "webhooks": [
                { "name": "a", "clientConfig": { "service": { "name": "svc" } } },
                { "name": "b", "clientConfig": { "caBundle": "bmV3" } },
                { "name": "c", "clientConfig": {} }
            ]
        }));

        let updated = prepare_update(&current, &desired).unwrap();
        let hooks = updated.data["webhooks"].as_array().unwrap();
        assert_eq!(hooks[0]["clientConfig"]["caBundle"], "Y2VydA==");
        assert_eq!(hooks[0]["clientConfig"]["service"]["name"], "svc");
        assert_eq!(hooks[1]["clientConfig"]["caBundle"], "bmV3");
        assert!(hooks[2]["clientConfig"].get("caBundle").is_none());
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_unnamed_webhook_is_malformed() {
        let current = object(json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "ValidatingWebhookConfiguration",
            "metadata": { "name": "sriov" },
            "webhooks": [{ "name": "a", "clientConfig": { "caBundle": "eA==" } }]
        }));
        let desired = object(json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "ValidatingWebhookConfiguration",
            "metadata": { "name": "sriov" },
            "webhooks": [{ "clientConfig": {} }]
        }));

        assert_matches!(
            prepare_update(&current, &desired),
            Err(Error::MalformedObject { .. })
        );
    }

    #[test]
    fn test_service_cluster_ip_preserved() {
        let current = object(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc", "resourceVersion": "7" },
            "spec": { "clusterIP": "10.0.0.5", "ports": [{ "port": 443 }] }
        }));
        let desired = object(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc" },
            "spec": { "ports": [{ "port": 443 }] }
        }));

        let updated = prepare_update(&current, &desired).unwrap();
        assert_eq!(updated.data["spec"]["clusterIP"], "10.0.0.5");

        let explicit = object(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc" },
            "spec": { "clusterIP": "10.0.0.9" }
        }));
        let updated = prepare_update(&current, &explicit).unwrap();
        assert_eq!(updated.data["spec"]["clusterIP"], "10.0.0.9");
    }

    #[test]
    fn test_service_account_secrets_carried_over() {
        let current = object(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": "sa" },
            "secrets": [{ "name": "sa-token-abc" }],
            "imagePullSecrets": [{ "name": "sa-dockercfg-abc" }]
        }));
        let desired = object(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": "sa" }
        }));

        let updated = prepare_update(&current, &desired).unwrap();
        assert_eq!(updated.data["secrets"][0]["name"], "sa-token-abc");
        assert_eq!(updated.data["imagePullSecrets"][0]["name"], "sa-dockercfg-abc");
    }

    #[test]
    fn test_deployment_revision_kept_unless_set() {
        let current = object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "d",
                "annotations": { "deployment.kubernetes.io/revision": "3", "team": "net" }
            }
        }));
        let desired = object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "d", "annotations": { "team": "sriov" }, "labels": { "app": "d" } }
        }));

        let updated = prepare_update(&current, &desired).unwrap();
        let annotations = updated.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[DEPLOYMENT_REVISION_ANNOTATION], "3");
        assert_eq!(annotations["team"], "sriov");
        assert_eq!(updated.metadata.labels.as_ref().unwrap()["app"], "d");
    }

    #[test]
    fn test_prepare_update_is_idempotent() {
        let current = object(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc", "resourceVersion": "5", "labels": { "a": "1" } },
            "spec": { "clusterIP": "10.0.0.5" }
        }));
        let desired = object(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc", "labels": { "b": "2" } },
            "spec": {}
        }));

        let once = prepare_update(&current, &desired).unwrap();
        let twice = prepare_update(&current, &once).unwrap();
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn test_no_metadata_maps_added_when_empty() {
        let current = object(json!({
            "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "c" }
        }));
        let desired = current.clone();
        let updated = prepare_update(&current, &desired).unwrap();
        assert!(updated.metadata.annotations.is_none());
        assert!(updated.metadata.labels.is_none());
    }

    #[test]
    fn test_service_account_with_secrets_unsupported() {
        let with_secrets = object(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": "sa" },
            "secrets": [{ "name": "token" }]
        }));
        assert_matches!(
            is_object_supported(&with_secrets),
            Err(Error::UnsupportedObject(_))
        );

        let plain = object(json!({
            "apiVersion": "v1", "kind": "ServiceAccount", "metadata": { "name": "sa" }
        }));
        assert!(is_object_supported(&plain).is_ok());
    }
}
