//! SriovNetworkPoolConfig CRD
//!
//! Groups nodes for parallel reconfiguration, or names a machine config pool
//! for OVS hardware offload. The two uses are mutually exclusive.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetworkPoolConfig",
    plural = "sriovnetworkpoolconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkPoolConfigSpec {
    /// Machine config pool to enable OVS hardware offload on
    #[serde(default)]
    pub ovs_hardware_offload_config: OvsHardwareOffloadConfig,

    /// Nodes belonging to this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,

    /// Number or percentage of nodes that may be reconfigured at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvsHardwareOffloadConfig {
    /// Name of the machine config pool
    #[serde(default)]
    pub name: String,
}

impl SriovNetworkPoolConfig {
    /// Resolve maxUnavailable against a node count.
    ///
    /// Returns `None` when unset. Percentages round down.
    pub fn max_unavailable(&self, num_nodes: u32) -> Result<Option<u32>> {
        let value = match &self.spec.max_unavailable {
            Some(v) => v,
            None => return Ok(None),
        };

        match value {
            IntOrString::Int(n) => {
                if *n < 0 {
                    return Err(Error::rejected("negative number is not allowed"));
                }
                Ok(Some(*n as u32))
            }
            IntOrString::String(s) => {
                let percent = s.strip_suffix('%').ok_or_else(|| {
                    Error::rejected("invalid type: strings needs to be a percentage")
                })?;
                let percent: i64 = percent
                    .parse()
                    .map_err(|e| Error::rejected(format!("invalid value {:?}: {}", s, e)))?;
                if !(1..=100).contains(&percent) {
                    return Err(Error::rejected(
                        "invalid value: percentage needs to be between 1 and 100",
                    ));
                }
                Ok(Some((percent as u64 * num_nodes as u64 / 100) as u32))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max: Option<IntOrString>) -> SriovNetworkPoolConfig {
        SriovNetworkPoolConfig::new(
            "pool",
            SriovNetworkPoolConfigSpec {
                max_unavailable: max,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_max_unavailable_unset() {
        assert_eq!(pool(None).max_unavailable(10).unwrap(), None);
    }

    #[test]
    fn test_max_unavailable_int() {
        assert_eq!(
            pool(Some(IntOrString::Int(2))).max_unavailable(10).unwrap(),
            Some(2)
        );
        assert!(pool(Some(IntOrString::Int(-1))).max_unavailable(10).is_err());
    }

    #[test]
    fn test_max_unavailable_percent() {
        assert_eq!(
            pool(Some(IntOrString::String("50%".into())))
                .max_unavailable(5)
                .unwrap(),
            Some(2)
        );
        assert!(pool(Some(IntOrString::String("0%".into())))
            .max_unavailable(5)
            .is_err());
        assert!(pool(Some(IntOrString::String("101%".into())))
            .max_unavailable(5)
            .is_err());
        assert!(pool(Some(IntOrString::String("3".into())))
            .max_unavailable(5)
            .is_err());
        assert!(pool(Some(IntOrString::String("x%".into())))
            .max_unavailable(5)
            .is_err());
    }
}
