//! Apply helpers
//!
//! Merge rules used when the operator overwrites objects it renders.

pub mod merge;

pub use merge::{is_object_supported, prepare_update, DEPLOYMENT_REVISION_ANNOTATION};
