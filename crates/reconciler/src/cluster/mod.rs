//! Cluster access used by the reconciler.
//!
//! The [`Cluster`] trait is the only way the engine touches cluster state:
//! read the descriptor, check the prerequisite secret, check whether a child
//! exists, and create a child. There is no update or delete.

mod api;
mod memory;

pub use api::KubeCluster;
pub use memory::{Fault, InMemoryCluster};

use async_trait::async_trait;

use crate::error::Result;
use crate::templates::{ChildKind, ChildResource};
use crate::types::{ObjectKey, VsCode};

/// Whether a named object exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Found,
    NotFound,
}

impl Presence {
    pub const fn is_found(self) -> bool {
        matches!(self, Self::Found)
    }
}

impl From<bool> for Presence {
    fn from(found: bool) -> Self {
        if found { Self::Found } else { Self::NotFound }
    }
}

/// What a create call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object did not exist and was created by this call.
    Created,
    /// Someone else created it first; the object exists either way.
    AlreadyExists,
}

/// Read and create access to the cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Fetch a descriptor. `None` means it was deleted or never existed.
    async fn get_descriptor(&self, key: &ObjectKey) -> Result<Option<VsCode>>;

    /// Check that a secret exists.
    async fn secret_presence(&self, namespace: &str, name: &str) -> Result<Presence>;

    /// Check whether a child exists under its fixed name.
    async fn child_presence(&self, namespace: &str, kind: ChildKind) -> Result<Presence>;

    /// Create a child in `namespace`.
    ///
    /// A conflict with an existing object of the same name must be reported
    /// as [`CreateOutcome::AlreadyExists`], not as an error.
    async fn create_child(&self, namespace: &str, child: &ChildResource) -> Result<CreateOutcome>;
}
