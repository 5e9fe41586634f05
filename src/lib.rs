//! SR-IOV Network Control Plane
//!
//! Admission, drain coordination and object merging for an operator that
//! configures SR-IOV virtual functions on cluster nodes from declarative
//! policies.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                        Admission Webhook (axum)                              │
//! │         /validating-webhook   /mutating-webhook   /metrics   /healthz        │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐  ┌─────────────────────┐  ┌─────────────────────┐  │
//! │  │     Admission       │  │       Drain         │  │       Merge         │  │
//! │  │     Validator       │  │    Coordinator      │  │      Engine         │  │
//! │  └──────────┬──────────┘  └──────────┬──────────┘  └─────────────────────┘  │
//! │             │                        │                                       │
//! │             └────────────┬───────────┘                                       │
//! │                          │                                                   │
//! │              ┌───────────┴───────────┐                                       │
//! │              │  Store Ports (traits) │                                       │
//! │              └───────────┬───────────┘                                       │
//! ├──────────────────────────┼──────────────────────────────────────────────────┤
//! │  ┌───────────────────────┴──────┐  ┌────────────────────────────────────┐   │
//! │  │   KubeStore (kube client)    │  │   MemoryStore (in process)         │   │
//! │  └──────────────────────────────┘  └────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`admission`]: Policy, operator config and pool config validation, policy defaults
//! - [`drain`]: Machine config pool pausing around node drains
//! - [`apply`]: Merge rules for overwriting live objects
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Store ports, label selectors, supported NIC table
//! - [`store`]: Store adapters
//! - [`webhook`]: HTTP surface
//! - [`error`]: Error types and handling

pub mod admission;
pub mod apply;
pub mod config;
pub mod crd;
pub mod domain;
pub mod drain;
pub mod error;
pub mod metrics;
pub mod store;
pub mod webhook;

// Re-export commonly used types
pub use admission::{mutate_policy, AdmissionConfig, AdmissionValidator, Verdict};

pub use apply::{is_object_supported, prepare_update};

pub use config::{ClusterType, ControlPlaneConfig};

pub use crd::{
    MachineConfigPool, SriovNetworkNodePolicy, SriovNetworkNodePolicySpec, SriovNetworkNodeState,
    SriovNetworkPoolConfig, SriovOperatorConfig,
};

pub use domain::ports::{
    ClusterStore, ClusterStoreRef, InfrastructureReader, MachineConfigStore, NodeReader,
    SriovReader,
};
pub use domain::SupportedNics;

pub use drain::{ClusterPlatform, DrainCoordinator};

pub use error::{Error, ErrorAction, Result};

pub use metrics::AdmissionMetrics;

pub use store::{KubeStore, MemoryStore};

pub use webhook::{WebhookRouter, WebhookServer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
