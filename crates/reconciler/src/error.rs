//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Fatal variants cannot be fixed by retrying the same pass; the controller
/// waits for the next watch event instead. Everything else is transient and
/// retried with backoff.
#[derive(Debug, Error)]
pub enum Error {
    /// Required runtime configuration is absent.
    #[error("missing required configuration: {key} is not set")]
    MissingConfig { key: &'static str },

    /// The prerequisite secret does not exist.
    #[error("secret '{name}' not found in namespace '{namespace}'; it must exist before the workload can start")]
    SecretNotFound { namespace: String, name: String },

    /// The descriptor carries identifiers that cannot form a path.
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// The descriptor has no UID, so children cannot point back at it.
    #[error("descriptor '{namespace}/{name}' has no uid; cannot set owner reference")]
    MissingOwnerUid { namespace: String, name: String },

    /// Request to the API server failed.
    #[error("cluster request failed: {0}")]
    Kube(#[from] kube::Error),

    /// Non-kube cluster backend failed.
    #[error("cluster unavailable during {operation}: {reason}")]
    ClusterUnavailable { operation: String, reason: String },
}

impl Error {
    /// Create a secret not found error.
    pub fn secret_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::SecretNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an invalid descriptor error.
    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    /// Create a missing owner uid error.
    pub fn missing_owner_uid(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingOwnerUid {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a cluster unavailable error.
    pub fn cluster_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ClusterUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the pass without outside intervention is pointless.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig { .. }
                | Self::SecretNotFound { .. }
                | Self::InvalidDescriptor { .. }
                | Self::MissingOwnerUid { .. }
        )
    }
}
