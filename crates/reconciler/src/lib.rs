//! Create-only convergence engine for per-task VS Code workloads.
//!
//! A `VsCode` record (`tools.robot.dev/v1alpha1`) names an organization and a
//! task execution. For each record the reconciler makes sure its namespace
//! holds:
//!
//! - **`pod`** - the editor workload, serving under
//!   `/tools/{orgId}/{taskExecutionId}/code`
//! - **`ui`** and **`api`** - services in front of the pod
//! - **`vscode`** VirtualService and DestinationRule - only when an ingress
//!   gateway is configured
//!
//! Every child is owned by the record, so deleting the record lets the
//! garbage collector remove them.
//!
//! # Key Concepts
//!
//! ## Passes
//!
//! A pass:
//! 1. Loads the record (gone means done)
//! 2. Resolves runtime configuration from the environment
//! 3. Checks that the `secret` secret exists
//! 4. Creates the first missing child, in fixed order, and stops
//!
//! ## Limitations
//!
//! - Child names are fixed, so a namespace holds at most one workload.
//! - Existing children are never updated; drift is not corrected.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vscode_reconciler::{
//!     EnvConfigSource, KubeCluster, ObjectKey, ReconcilerBuilder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> vscode_reconciler::Result<()> {
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_cluster(Arc::new(KubeCluster::try_default().await?))
//!         .with_config_source(Arc::new(EnvConfigSource::new()))
//!         .build()?;
//!
//!     let outcome = reconciler.reconcile(&ObjectKey::new("ns1", "workspace")).await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod istio;
pub mod reconciler;
pub mod templates;
pub mod types;

// Re-export main types
pub use cluster::{Cluster, CreateOutcome, Fault, InMemoryCluster, KubeCluster, Presence};
pub use config::{ConfigSource, EnvConfigSource, RuntimeConfig, StaticConfigSource};
pub use controller::{Backoff, ControllerConfig};
pub use error::{Error, Result};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use templates::{ChildKind, ChildResource};
pub use types::{ObjectKey, ReconcileOutcome, VsCode, VsCodeSpec, derived_path};
