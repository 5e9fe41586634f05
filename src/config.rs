//! Control plane configuration

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Default operator namespace
pub const DEFAULT_NAMESPACE: &str = "openshift-sriov-network-operator";

/// Kind of cluster the control plane runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClusterType {
    #[default]
    Kubernetes,
    OpenShift,
}

impl FromStr for ClusterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kubernetes" => Ok(ClusterType::Kubernetes),
            "openshift" => Ok(ClusterType::OpenShift),
            other => Err(Error::Configuration(format!(
                "unknown cluster type {:?}, expected kubernetes or openshift",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterType::Kubernetes => write!(f, "kubernetes"),
            ClusterType::OpenShift => write!(f, "openshift"),
        }
    }
}

/// Process-wide settings shared by the components
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Namespace holding the operator's own resources
    pub namespace: String,
    pub cluster_type: ClusterType,
    /// Skip the supported NIC model checks
    pub dev_mode: bool,
    /// Optional YAML map of supported NIC models replacing the built-in table
    pub supported_nics_file: Option<PathBuf>,
    /// Webhook listen address
    pub webhook_addr: SocketAddr,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cluster_type: ClusterType::default(),
            dev_mode: false,
            supported_nics_file: None,
            webhook_addr: SocketAddr::from(([0, 0, 0, 0], 6443)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_type_parse() {
        assert_eq!("OpenShift".parse::<ClusterType>().unwrap(), ClusterType::OpenShift);
        assert_eq!("kubernetes".parse::<ClusterType>().unwrap(), ClusterType::Kubernetes);
        assert!("nomad".parse::<ClusterType>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.webhook_addr.port(), 6443);
        assert!(!config.dev_mode);
    }
}
