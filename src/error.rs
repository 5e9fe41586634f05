//! Error types for the SR-IOV control plane
//!
//! Provides structured error types for admission validation, drain
//! coordination, object merging and store access.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Store Access Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Conflicting write on {kind}/{name}: resource version {expected} is stale")]
    StoreConflict {
        kind: String,
        name: String,
        expected: String,
    },

    // =========================================================================
    // Admission Errors
    // =========================================================================
    #[error("{0}")]
    ValidationRejected(String),

    #[error("{reason}")]
    ConfigurationConflict { existing: String, reason: String },

    #[error("no matched node is selected by the nodeSelector in CR {policy}")]
    NoMatchedNode { policy: String },

    #[error("no supported NIC is selected by the nicSelector in CR {policy}")]
    NoSupportedNic {
        policy: String,
        reasons: Vec<(String, Vec<String>)>,
    },

    // =========================================================================
    // Drain Coordination Errors
    // =========================================================================
    #[error("Machine config pool lookup failed for node {node}: {reason}")]
    PoolLookup { node: String, reason: String },

    // =========================================================================
    // Merge Errors
    // =========================================================================
    #[error("Unsupported object: {0}")]
    UnsupportedObject(String),

    #[error("Malformed {kind} object: {reason}")]
    MalformedObject { kind: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action a caller should take when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for the user to change something
    NoRequeue,
}

impl Error {
    /// Determine what action the caller should take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient store errors - retry with backoff
            Error::Kube(_) | Error::StoreConflict { .. } => ErrorAction::RequeueWithBackoff,

            // Objects may show up later (node annotations, machine configs)
            Error::ResourceNotFound { .. } | Error::PoolLookup { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(30))
            }

            // Admission decisions and bad inputs require a user fix
            Error::ValidationRejected(_)
            | Error::ConfigurationConflict { .. }
            | Error::NoMatchedNode { .. }
            | Error::NoSupportedNic { .. }
            | Error::UnsupportedObject(_)
            | Error::MalformedObject { .. }
            | Error::Configuration(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::NoRequeue,

            Error::Internal(_) | Error::Io(_) => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is a transient store failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::StoreConflict { .. })
    }

    /// Check if this error is an admission rejection
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::ValidationRejected(_)
                | Error::ConfigurationConflict { .. }
                | Error::NoMatchedNode { .. }
                | Error::NoSupportedNic { .. }
        )
    }

    /// Build a rejection from a message
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Error::ValidationRejected(message.into())
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;
