//! SriovOperatorConfig CRD
//!
//! Operator-wide settings. Only the object named `default` in the operator
//! namespace is honoured.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the only SriovOperatorConfig the operator reads
pub const DEFAULT_CONFIG_NAME: &str = "default";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovOperatorConfig",
    plural = "sriovoperatorconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovOperatorConfigSpec {
    /// Nodes the config daemon runs on
    #[serde(default)]
    pub config_daemon_node_selector: BTreeMap<String, String>,

    /// Deploy the network resources injector
    #[serde(default)]
    pub enable_injector: bool,

    /// Deploy the operator admission webhook
    #[serde(default)]
    pub enable_operator_webhook: bool,

    /// Verbosity of the operator components
    #[serde(default)]
    pub log_level: i32,

    /// Skip draining nodes before reconfiguring them
    #[serde(default)]
    pub disable_drain: bool,

    #[serde(default)]
    pub configuration_mode: String,

    #[serde(default)]
    pub feature_gates: BTreeMap<String, bool>,
}
