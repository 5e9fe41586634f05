//! Cluster platform detection

use crate::config::ClusterType;
use crate::crd::TOPOLOGY_EXTERNAL;
use crate::domain::ports::InfrastructureReader;
use crate::error::Result;
use tracing::info;

/// Flavor of an OpenShift cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenShiftFlavor {
    /// Self-managed control plane with machine config pools
    Default,
    /// Hosted control plane, no machine config pools on the cluster
    Hypershift,
}

/// Platform the drain coordinator runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPlatform {
    Kubernetes,
    OpenShift(OpenShiftFlavor),
}

impl ClusterPlatform {
    /// Whether node rollouts go through machine config pools
    pub fn uses_machine_config_pools(&self) -> bool {
        matches!(self, ClusterPlatform::OpenShift(OpenShiftFlavor::Default))
    }

    /// Resolve the platform, reading the Infrastructure object on OpenShift
    pub async fn detect<I>(cluster_type: ClusterType, infra: &I) -> Result<Self>
    where
        I: InfrastructureReader + ?Sized,
    {
        let platform = match cluster_type {
            ClusterType::Kubernetes => ClusterPlatform::Kubernetes,
            ClusterType::OpenShift => {
                let hosted = infra
                    .get_infrastructure()
                    .await?
                    .and_then(|i| i.status)
                    .map(|s| s.control_plane_topology == TOPOLOGY_EXTERNAL)
                    .unwrap_or(false);
                if hosted {
                    ClusterPlatform::OpenShift(OpenShiftFlavor::Hypershift)
                } else {
                    ClusterPlatform::OpenShift(OpenShiftFlavor::Default)
                }
            }
        };

        info!("Detected cluster platform {:?}", platform);
        Ok(platform)
    }
}
