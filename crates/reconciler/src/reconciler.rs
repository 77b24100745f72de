//! Reconciler implementation.
//!
//! One call to [`Reconciler::reconcile`] is one convergence pass. A pass walks
//! the children in [`ChildKind::ORDER`], creates the first missing one and
//! stops, so each pass performs at most one mutation. A later child is never
//! created before every earlier one is confirmed present.
//!
//! Convergence is create-only: an existing child is never compared against
//! its template, updated or deleted. Drift is observed by the periodic
//! steady-state requeue but never corrected.

use std::sync::Arc;
use std::time::Duration;

use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::cluster::{Cluster, CreateOutcome};
use crate::config::{ConfigSource, RuntimeConfig};
use crate::error::{Error, Result};
use crate::templates::{self, ChildKind, SECRET_NAME};
use crate::types::{ObjectKey, ReconcileOutcome, VsCode};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Delay after creating the pod; pod startup is asynchronous and an
    /// immediate re-check would only see it missing again.
    pub pod_requeue: Duration,
    /// Polling interval once everything exists.
    pub steady_state_requeue: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pod_requeue: Duration::from_secs(30),
            steady_state_requeue: Duration::from_secs(30),
        }
    }
}

/// Convergence engine for [`VsCode`] descriptors.
pub struct Reconciler {
    /// Cluster access.
    cluster: Arc<dyn Cluster>,
    /// Runtime configuration, resolved per pass.
    config_source: Arc<dyn ConfigSource>,
    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        cluster: Arc<dyn Cluster>,
        config_source: Arc<dyn ConfigSource>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            cluster,
            config_source,
            config,
        }
    }

    /// Run one convergence pass for the descriptor at `key`.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`Error::is_fatal`]) mean the pass cannot succeed until
    /// something outside the operator changes. Any other error is a
    /// transient cluster failure and the pass may be retried.
    #[instrument(level = "info", skip(self, key), fields(descriptor = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(vscode) = self.cluster.get_descriptor(key).await? else {
            info!("VsCode resource not found, assuming it was deleted");
            return Ok(ReconcileOutcome::Done);
        };

        let outcome = self.converge(key, &vscode).await;
        if let Err(err) = &outcome {
            if err.is_fatal() {
                error!(error = %err, "Reconciliation failed, waiting for a change");
            } else {
                warn!(error = %err, "Reconciliation failed, will retry");
            }
        }
        outcome
    }

    async fn converge(&self, key: &ObjectKey, vscode: &VsCode) -> Result<ReconcileOutcome> {
        vscode.spec.validate()?;

        let config = self.config_source.resolve().await?;
        debug!(
            image = %config.container_image,
            root_domain = %config.root_domain,
            gateway = ?config.routing_gateway,
            "Resolved runtime configuration"
        );

        self.ensure_secret(&key.namespace).await?;

        if !config.routing_enabled() {
            debug!("Routing is disabled");
        }

        for kind in ChildKind::desired(&config) {
            if let Some(outcome) = self.ensure_child(key, vscode, &config, kind).await? {
                return Ok(outcome);
            }
        }

        info!("All child resources present");
        Ok(ReconcileOutcome::RequeueAfter(self.config.steady_state_requeue))
    }

    /// The secret checked here is the one the pod template reads its
    /// environment from.
    async fn ensure_secret(&self, namespace: &str) -> Result<()> {
        if self
            .cluster
            .secret_presence(namespace, SECRET_NAME)
            .await?
            .is_found()
        {
            debug!(secret = SECRET_NAME, "Secret found");
            Ok(())
        } else {
            Err(Error::secret_not_found(namespace, SECRET_NAME))
        }
    }

    /// Make sure `kind` exists.
    ///
    /// Returns `Some(outcome)` when this call created the child and the pass
    /// must stop, `None` when the child already exists and the pass moves on.
    async fn ensure_child(
        &self,
        key: &ObjectKey,
        vscode: &VsCode,
        config: &RuntimeConfig,
        kind: ChildKind,
    ) -> Result<Option<ReconcileOutcome>> {
        if self
            .cluster
            .child_presence(&key.namespace, kind)
            .await?
            .is_found()
        {
            debug!(child = %kind, "Child present");
            return Ok(None);
        }

        let Some(mut child) = templates::build(kind, &key.namespace, &vscode.spec, config) else {
            return Ok(None);
        };
        child.set_owner(owner_reference(vscode)?);

        info!(child = %kind, namespace = %key.namespace, "Creating child resource");
        match self.cluster.create_child(&key.namespace, &child).await? {
            CreateOutcome::Created => Ok(Some(self.requeue_after_create(kind))),
            CreateOutcome::AlreadyExists => {
                info!(child = %kind, "Child created concurrently, treating as present");
                Ok(None)
            }
        }
    }

    const fn requeue_after_create(&self, kind: ChildKind) -> ReconcileOutcome {
        match kind {
            ChildKind::Pod => ReconcileOutcome::RequeueAfter(self.config.pod_requeue),
            ChildKind::UiService
            | ChildKind::ApiService
            | ChildKind::VirtualService
            | ChildKind::DestinationRule => ReconcileOutcome::RequeueNow,
        }
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Controller owner reference pointing at `vscode`.
///
/// Deletion of the descriptor is blocked until its children are gone when
/// the platform deletes in the foreground.
fn owner_reference(
    vscode: &VsCode,
) -> Result<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference> {
    let mut owner = vscode.controller_owner_ref(&()).ok_or_else(|| {
        Error::missing_owner_uid(vscode.namespace().unwrap_or_default(), vscode.name_any())
    })?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    cluster: Option<Arc<dyn Cluster>>,
    config_source: Option<Arc<dyn ConfigSource>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            cluster: None,
            config_source: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the cluster backend.
    #[must_use]
    pub fn with_cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Set the configuration source.
    #[must_use]
    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the delay after creating the pod.
    #[must_use]
    pub const fn pod_requeue(mut self, delay: Duration) -> Self {
        self.config.pod_requeue = delay;
        self
    }

    /// Set the steady-state polling interval.
    #[must_use]
    pub const fn steady_state_requeue(mut self, delay: Duration) -> Self {
        self.config.steady_state_requeue = delay;
        self
    }

    /// Build the reconciler.
    ///
    /// Without a configuration source the process environment is used.
    ///
    /// # Errors
    ///
    /// Returns an error if no cluster backend was set.
    pub fn build(self) -> Result<Reconciler> {
        let cluster = self
            .cluster
            .ok_or_else(|| Error::cluster_unavailable("build reconciler", "no cluster backend"))?;

        let config_source = self
            .config_source
            .unwrap_or_else(|| Arc::new(crate::config::EnvConfigSource::new()));

        Ok(Reconciler::new(cluster, config_source, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
