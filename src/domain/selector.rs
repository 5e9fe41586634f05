//! Label selector helpers
//!
//! Converts label selectors into list query strings for the API server and
//! evaluates them locally for in-process stores.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// Build a selector that matches exactly the given labels
pub fn from_labels(labels: &BTreeMap<String, String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels.clone()),
        match_expressions: None,
    }
}

/// Render a selector in the API server's query syntax.
///
/// An empty selector renders as the empty string, which matches everything.
pub fn to_query(selector: &LabelSelector) -> Result<String> {
    let mut terms = Vec::new();

    if let Some(labels) = &selector.match_labels {
        for (k, v) in labels {
            terms.push(format!("{}={}", k, v));
        }
    }

    for req in selector.match_expressions.iter().flatten() {
        let values = req.values.clone().unwrap_or_default();
        let term = match req.operator.as_str() {
            "In" => format!("{} in ({})", req.key, values.join(",")),
            "NotIn" => format!("{} notin ({})", req.key, values.join(",")),
            "Exists" => req.key.clone(),
            "DoesNotExist" => format!("!{}", req.key),
            other => {
                return Err(Error::Configuration(format!(
                    "unsupported label selector operator {:?} for key {}",
                    other, req.key
                )))
            }
        };
        terms.push(term);
    }

    Ok(terms.join(","))
}

/// Evaluate a selector against a label set
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_ok = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));

    labels_ok
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|req| requirement_matches(req, labels))
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = req.values.as_deref().unwrap_or(&[]);
    match req.operator.as_str() {
        "In" => labels.get(&req.key).map(|v| values.contains(v)).unwrap_or(false),
        "NotIn" => labels.get(&req.key).map(|v| !values.contains(v)).unwrap_or(true),
        "Exists" => labels.contains_key(&req.key),
        "DoesNotExist" => !labels.contains_key(&req.key),
        _ => false,
    }
}
