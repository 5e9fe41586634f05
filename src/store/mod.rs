//! Store Adapters
//!
//! Provides implementations of the store ports for:
//! - The Kubernetes API server (kube client)
//! - An in-process store

pub mod kube_store;
pub mod memory;

pub use kube_store::*;
pub use memory::*;
