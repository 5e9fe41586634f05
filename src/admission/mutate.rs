//! Policy defaulting
//!
//! Fills the fields a policy leaves out before it is stored. Works on the raw
//! object because defaults depend on whether a field is present at all, which
//! the typed spec cannot tell apart from its zero value.

use crate::crd::{DEFAULT_POLICY_NAME, LINK_TYPE_IB};
use crate::error::Result;
use json_patch::{AddOperation, PatchOperation};
use serde::Deserialize;
use serde_json::Value;

/// Priority given to policies that do not set one
pub const DEFAULT_PRIORITY: i64 = 99;

fn add(path: &str, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: path.to_string(),
        value,
    })
}

#[derive(Debug, Default, Deserialize)]
struct PresentFields {
    #[serde(default)]
    metadata: PresentMetadata,
    #[serde(default)]
    spec: PresentSpec,
}

#[derive(Debug, Default, Deserialize)]
struct PresentMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresentSpec {
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    is_rdma: Option<Value>,
    #[serde(default)]
    link_type: Option<String>,
}

/// Defaulting patch for a raw SriovNetworkNodePolicy
pub fn mutate_policy(object: &Value) -> Result<Vec<PatchOperation>> {
    let fields: PresentFields = serde_json::from_value(object.clone())?;
    let mut patch = Vec::new();

    if fields.metadata.name.as_deref() == Some(DEFAULT_POLICY_NAME) {
        return Ok(patch);
    }

    if fields.spec.priority.is_none() {
        patch.push(add("/spec/priority", Value::from(DEFAULT_PRIORITY)));
    }

    if fields.spec.is_rdma.is_none() {
        patch.push(add("/spec/isRdma", Value::Bool(false)));
    }

    let infiniband = fields
        .spec
        .link_type
        .as_deref()
        .map(|t| t.eq_ignore_ascii_case(LINK_TYPE_IB))
        .unwrap_or(false);
    if infiniband {
        patch.push(add("/spec/isRdma", Value::Bool(true)));
    }

    Ok(patch)
}
