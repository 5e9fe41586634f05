//! OpenShift platform resources
//!
//! The subset of MachineConfigPool, MachineConfig and Infrastructure that the
//! drain coordinator reads and patches.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation on a node naming the MachineConfig it should run
pub const DESIRED_MACHINE_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";

/// Name of the cluster-wide Infrastructure object
pub const INFRASTRUCTURE_NAME: &str = "cluster";

/// Control plane topology of hosted (Hypershift) clusters
pub const TOPOLOGY_EXTERNAL: &str = "External";

// =============================================================================
// MachineConfigPool
// =============================================================================

/// A group of nodes rolled out together by the machine config operator.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    plural = "machineconfigpools",
    status = "MachineConfigPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Nodes belonging to the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,

    /// Stops the machine config operator from updating the pool
    #[serde(default)]
    pub paused: bool,

    /// Rendered configuration the pool should reach
    #[serde(default)]
    pub configuration: RenderedConfiguration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    /// Rendered configuration the pool currently runs
    #[serde(default)]
    pub configuration: RenderedConfiguration,

    #[serde(default)]
    pub machine_count: i32,

    #[serde(default)]
    pub updated_machine_count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderedConfiguration {
    #[serde(default)]
    pub name: String,
}

impl MachineConfigPool {
    /// Desired rendered configuration name
    pub fn desired_config(&self) -> &str {
        &self.spec.configuration.name
    }

    /// Current rendered configuration name
    pub fn current_config(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.configuration.name.as_str())
            .unwrap_or("")
    }

    /// True when no rollout is in flight: both names known and equal
    pub fn rollout_in_sync(&self) -> bool {
        let desired = self.desired_config();
        !desired.is_empty() && desired == self.current_config()
    }

    /// Value of an annotation, if set
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }
}

// =============================================================================
// MachineConfig
// =============================================================================

/// A machine configuration. Only its owner references are consumed here.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfig",
    plural = "machineconfigs"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    #[serde(default, rename = "osImageURL", skip_serializing_if = "Option::is_none")]
    pub os_image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_type: Option<String>,
}

impl MachineConfig {
    /// Name of the owning MachineConfigPool, if any
    pub fn owning_pool(&self) -> Option<&str> {
        self.owner_references()
            .iter()
            .find(|owner| owner.kind == "MachineConfigPool")
            .map(|owner| owner.name.as_str())
    }
}

// =============================================================================
// Infrastructure
// =============================================================================

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Infrastructure",
    plural = "infrastructures",
    status = "InfrastructureStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_spec: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    /// HighlyAvailable, SingleReplica or External
    #[serde(default)]
    pub control_plane_topology: String,

    #[serde(default)]
    pub infrastructure_topology: String,
}
