//! Domain layer - store ports and shared domain tables
//!
//! This module defines the traits (ports) that store adapters implement,
//! plus label selector helpers and the supported NIC table.

pub mod nics;
pub mod ports;
pub mod selector;

pub use nics::*;
pub use ports::*;
