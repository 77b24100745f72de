//! Binds the [`Reconciler`] to a `kube` controller.
//!
//! The controller watches `VsCode` objects (and the pods and services they
//! own), runs at most one pass per object at a time, and turns each
//! [`ReconcileOutcome`] into a requeue decision. Transient failures are
//! retried with per-object exponential backoff; fatal failures wait for the
//! next change to the object.
//!
//! Watching owned pods and services means the pod becoming visible triggers
//! the next pass right away, so the post-pod requeue delay is an upper bound
//! rather than a fixed wait. It also means an externally deleted child is
//! recreated without waiting for the steady-state requeue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client};
use tracing::{debug, info, warn};

use crate::cluster::KubeCluster;
use crate::config::ConfigSource;
use crate::error::{Error, Result};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::types::{ObjectKey, ReconcileOutcome, VsCode};

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl Backoff {
    /// Delay after `failures` consecutive failures, counting from zero.
    pub fn delay(&self, failures: u32) -> Duration {
        2_u32
            .checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Configuration for the controller.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Restrict the watch to one namespace. `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Backoff applied to transient errors.
    pub backoff: Backoff,
    /// Engine configuration.
    pub reconciler: ReconcilerConfig,
}

/// Shared state handed to every pass.
pub struct Context {
    reconciler: Reconciler,
    backoff: Backoff,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl Context {
    /// Create a new context.
    pub fn new(reconciler: Reconciler, backoff: Backoff) -> Self {
        Self {
            reconciler,
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and return how long to wait before retrying.
    fn next_retry(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay(*count);
        *count = count.saturating_add(1);
        delay
    }

    fn reset(&self, key: &ObjectKey) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop failure counts for descriptors that no longer exist.
    ///
    /// A descriptor deleted while backing off is never reconciled again, so
    /// its entry would otherwise stay forever.
    pub fn forget_unless(&self, mut exists: impl FnMut(&ObjectKey) -> bool) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| exists(key));
    }

    /// Consecutive failures recorded for `key`.
    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

/// Scheduler action for a pass outcome.
pub fn to_action(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        ReconcileOutcome::RequeueNow => Action::requeue(Duration::ZERO),
    }
}

/// Controller entry point for one object.
///
/// # Errors
///
/// Propagates the pass error to [`error_policy`].
pub async fn reconcile(vscode: Arc<VsCode>, ctx: Arc<Context>) -> Result<Action> {
    let Some(key) = ObjectKey::of(&vscode) else {
        warn!("Ignoring VsCode without a namespace");
        return Ok(Action::await_change());
    };

    let outcome = ctx.reconciler.reconcile(&key).await?;
    ctx.reset(&key);
    Ok(to_action(outcome))
}

/// Requeue policy for failed passes.
pub fn error_policy(vscode: Arc<VsCode>, err: &Error, ctx: Arc<Context>) -> Action {
    let Some(key) = ObjectKey::of(&vscode) else {
        return Action::await_change();
    };

    if err.is_fatal() {
        ctx.reset(&key);
        return Action::await_change();
    }

    let delay = ctx.next_retry(&key);
    debug!(descriptor = %key, ?delay, "Backing off");
    Action::requeue(delay)
}

fn scoped<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    }
}

/// Run the controller until a shutdown signal arrives.
pub async fn run(
    cluster: KubeCluster,
    config_source: Arc<dyn ConfigSource>,
    config: ControllerConfig,
) {
    let client = cluster.client().clone();
    let namespace = config.namespace.as_deref();

    let vscodes = scoped::<VsCode>(client.clone(), namespace);
    let pods = scoped::<Pod>(client.clone(), namespace);
    let services = scoped::<Service>(client, namespace);

    let reconciler = Reconciler::new(Arc::new(cluster), config_source, config.reconciler);
    let ctx = Arc::new(Context::new(reconciler, config.backoff));

    let controller = Controller::new(vscodes, watcher::Config::default())
        .owns(pods, watcher::Config::default())
        .owns(services, watcher::Config::default());
    let store = controller.store();

    info!(namespace = ?config.namespace, "Starting VsCode controller");
    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::clone(&ctx))
        .for_each(|result| {
            match result {
                Ok((object, action)) => debug!(%object, ?action, "Pass finished"),
                Err(err) => warn!(error = %err, "Controller error"),
            }
            ctx.forget_unless(|key| {
                store
                    .get(&ObjectRef::new(&key.name).within(&key.namespace))
                    .is_some()
            });
            futures::future::ready(())
        })
        .await;
    info!("VsCode controller stopped");
}
