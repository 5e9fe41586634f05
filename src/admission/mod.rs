//! Admission Validation
//!
//! Decides whether SR-IOV policy, operator config and pool config objects
//! may be persisted, and fills defaults into policies before they are.
//!
//! # Verdicts
//!
//! Every check returns a [`Verdict`]: rejections carry the error that caused
//! them, warnings are returned to the requester either way.

pub mod mutate;
pub mod nic_match;
pub mod operator_config;
pub mod policy;
pub mod pool_config;

pub use mutate::mutate_policy;
pub use policy::SelectionReport;

use crate::config::{ControlPlaneConfig, DEFAULT_NAMESPACE};
use crate::domain::nics::SupportedNics;
use crate::domain::ports::ClusterStoreRef;
use crate::error::Error;

/// Settings of the admission validator
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Namespace whose objects the operator acts on
    pub operator_namespace: String,
    /// Skip the supported NIC model checks
    pub dev_mode: bool,
    pub supported_nics: SupportedNics,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            operator_namespace: DEFAULT_NAMESPACE.to_string(),
            dev_mode: false,
            supported_nics: SupportedNics::default(),
        }
    }
}

impl AdmissionConfig {
    pub fn from_control_plane(config: &ControlPlaneConfig, supported_nics: SupportedNics) -> Self {
        Self {
            operator_namespace: config.namespace.clone(),
            dev_mode: config.dev_mode,
            supported_nics,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug)]
pub struct Verdict {
    pub allowed: bool,
    pub warnings: Vec<String>,
    /// Why the object was rejected, or the store failure that prevented a decision
    pub error: Option<Error>,
}

impl Verdict {
    pub fn allow(warnings: Vec<String>) -> Self {
        Self {
            allowed: true,
            warnings,
            error: None,
        }
    }

    pub fn deny(warnings: Vec<String>, error: Error) -> Self {
        Self {
            allowed: false,
            warnings,
            error: Some(error),
        }
    }

    /// Rejection message shown to the requester
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Validates operator objects against the cluster state
///
/// Holds no mutable state: every call reads what it needs from the store.
pub struct AdmissionValidator {
    store: ClusterStoreRef,
    config: AdmissionConfig,
}

impl AdmissionValidator {
    pub fn new(store: ClusterStoreRef, config: AdmissionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }
}
