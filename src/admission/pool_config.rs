//! SriovNetworkPoolConfig validation

use super::{AdmissionValidator, Verdict};
use crate::crd::SriovNetworkPoolConfig;
use crate::error::Error;
use kube::core::admission::Operation;

impl AdmissionValidator {
    /// Validate a pool config create, update or delete
    pub fn validate_pool_config(
        &self,
        pool_config: &SriovNetworkPoolConfig,
        operation: Operation,
    ) -> Verdict {
        let warnings = Vec::new();

        if matches!(operation, Operation::Delete) {
            return Verdict::allow(warnings);
        }

        let spec = &pool_config.spec;
        let parallel = spec.max_unavailable.is_some() || spec.node_selector.is_some();
        if parallel && !spec.ovs_hardware_offload_config.name.is_empty() {
            return Verdict::deny(
                warnings,
                Error::rejected(
                    "SriovNetworkPoolConfig can't have both parallel configuration and OvsHardwareOffloadConfig",
                ),
            );
        }

        if let Err(e) = pool_config.max_unavailable(0) {
            return Verdict::deny(
                warnings,
                Error::rejected(format!("SriovNetworkPoolConfig invalid maxUnavailable: {}", e)),
            );
        }

        Verdict::allow(warnings)
    }
}
