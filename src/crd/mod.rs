//! Custom Resource Definitions consumed by the control plane
//!
//! - SriovNetworkNodePolicy: what to configure on which PFs
//! - SriovNetworkNodeState: observed hardware per node
//! - SriovOperatorConfig / SriovNetworkPoolConfig: operator settings
//! - MachineConfigPool, MachineConfig, Infrastructure: OpenShift platform objects

pub mod node_policy;
pub mod node_state;
pub mod openshift;
pub mod operator_config;
pub mod pool_config;

pub use node_policy::*;
pub use node_state::*;
pub use openshift::*;
pub use operator_config::*;
pub use pool_config::*;

/// Annotation carrying the operator's drain/pause state on nodes and pools
pub const STATE_ANNOTATION: &str = "sriovnetwork.openshift.io/state";

/// Annotation values
pub const STATE_IDLE: &str = "Idle";
pub const STATE_PAUSED: &str = "Paused";
