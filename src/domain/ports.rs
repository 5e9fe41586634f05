//! Domain Ports - store capabilities used by the control plane
//!
//! Each trait covers one concern. `ClusterStore` composes them so callers
//! hold a single handle while adapters stay free to implement each concern
//! on its own.

use crate::crd::{
    Infrastructure, MachineConfig, MachineConfigPool, SriovNetworkNodePolicy, SriovNetworkNodeState,
    SriovOperatorConfig,
};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::sync::Arc;

// =============================================================================
// Node Reader Port
// =============================================================================

/// Read access to cluster nodes
#[async_trait]
pub trait NodeReader: Send + Sync {
    /// List nodes matching a label selector
    async fn list_nodes(&self, selector: &LabelSelector) -> Result<Vec<Node>>;
}

// =============================================================================
// SR-IOV Object Reader Port
// =============================================================================

/// Read access to the operator's own custom resources
#[async_trait]
pub trait SriovReader: Send + Sync {
    /// List node states in a namespace
    async fn list_node_states(&self, namespace: &str) -> Result<Vec<SriovNetworkNodeState>>;

    /// List node policies in a namespace
    async fn list_node_policies(&self, namespace: &str) -> Result<Vec<SriovNetworkNodePolicy>>;

    /// Get an operator config, `None` when it does not exist
    async fn get_operator_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SriovOperatorConfig>>;
}

// =============================================================================
// Machine Config Port
// =============================================================================

/// Access to OpenShift machine configs and pools
#[async_trait]
pub trait MachineConfigStore: Send + Sync {
    /// Get a rendered machine config
    async fn get_machine_config(&self, name: &str) -> Result<MachineConfig>;

    /// Get a machine config pool
    async fn get_pool(&self, name: &str) -> Result<MachineConfigPool>;

    /// Set `spec.paused` on a pool and return the updated pool
    async fn set_pool_paused(&self, name: &str, paused: bool) -> Result<MachineConfigPool>;

    /// Set an annotation on a pool.
    ///
    /// The write is conditional on the pool's resource version so that two
    /// writers deciding from the same read cannot both succeed.
    async fn annotate_pool(
        &self,
        pool: &MachineConfigPool,
        key: &str,
        value: &str,
    ) -> Result<MachineConfigPool>;
}

// =============================================================================
// Infrastructure Port
// =============================================================================

/// Read access to the platform's infrastructure description
#[async_trait]
pub trait InfrastructureReader: Send + Sync {
    /// Get the cluster infrastructure object, `None` when absent
    async fn get_infrastructure(&self) -> Result<Option<Infrastructure>>;
}

// =============================================================================
// Composed Store
// =============================================================================

/// Every store capability behind one handle
pub trait ClusterStore: NodeReader + SriovReader + MachineConfigStore + InfrastructureReader {}

impl<T> ClusterStore for T where T: NodeReader + SriovReader + MachineConfigStore + InfrastructureReader {}

pub type ClusterStoreRef = Arc<dyn ClusterStore>;
