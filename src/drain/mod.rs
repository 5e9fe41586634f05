//! Drain Coordination
//!
//! Keeps SR-IOV node drains from overlapping with platform-driven node
//! rollouts.

pub mod coordinator;
pub mod platform;

pub use coordinator::DrainCoordinator;
pub use platform::{ClusterPlatform, OpenShiftFlavor};
