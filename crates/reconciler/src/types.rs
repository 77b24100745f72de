//! Core types for the reconciler.

use std::fmt;
use std::time::Duration;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Desired state of one interactive coding workload.
///
/// The record is created and deleted by the platform; the reconciler only
/// observes it. Every child resource name and the public path are derived
/// from it.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "tools.robot.dev",
    version = "v1alpha1",
    kind = "VsCode",
    plural = "vscodes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VsCodeSpec {
    /// Workforce organization ID.
    #[serde(default)]
    pub org_id: String,
    /// Task execution ID.
    #[serde(default)]
    pub task_execution_id: String,
}

impl VsCodeSpec {
    /// Create a spec from its two identifiers.
    pub fn new(org_id: impl Into<String>, task_execution_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            task_execution_id: task_execution_id.into(),
        }
    }

    /// Public path prefix of the workload.
    pub fn derived_path(&self) -> String {
        derived_path(&self.org_id, &self.task_execution_id)
    }

    /// Reject identifiers that would produce a malformed path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when an identifier is empty or
    /// contains a `/`.
    pub fn validate(&self) -> Result<()> {
        [
            ("orgId", self.org_id.as_str()),
            ("taskExecutionId", self.task_execution_id.as_str()),
        ]
        .into_iter()
        .try_for_each(|(field, value)| {
            if value.is_empty() {
                Err(Error::invalid_descriptor(format!("{field} is empty")))
            } else if value.contains('/') {
                Err(Error::invalid_descriptor(format!(
                    "{field} '{value}' contains '/'"
                )))
            } else {
                Ok(())
            }
        })
    }
}

/// Path shared by the workload's base path and the routing prefix match.
///
/// Both consumers must use this exact value or routed requests miss the
/// workload's router.
pub fn derived_path(org_id: &str, task_execution_id: &str) -> String {
    format!("/tools/{org_id}/{task_execution_id}/code")
}

/// Namespaced identity of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace holding the descriptor and all of its children.
    pub namespace: String,
    /// Descriptor name.
    pub name: String,
}

impl ObjectKey {
    /// Create a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing descriptor, if it is namespaced.
    pub fn of(vscode: &VsCode) -> Option<Self> {
        vscode
            .namespace()
            .map(|namespace| Self::new(namespace, vscode.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of one convergence pass, as handed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do for this descriptor.
    Done,
    /// Run another pass after the given delay.
    RequeueAfter(Duration),
    /// Run another pass right away.
    RequeueNow,
}

impl ReconcileOutcome {
    /// Delay before the next pass, if one is wanted.
    pub const fn requeue_delay(self) -> Option<Duration> {
        match self {
            Self::Done => None,
            Self::RequeueAfter(delay) => Some(delay),
            Self::RequeueNow => Some(Duration::ZERO),
        }
    }
}
