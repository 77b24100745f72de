//! In-memory [`Cluster`] for tests.
//!
//! Behaves like an API server that accepts every create: objects become
//! visible immediately and a second create of the same name conflicts.
//! Faults can be queued to simulate transient failures and lost races.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cluster, CreateOutcome, Presence};
use crate::error::{Error, Result};
use crate::templates::{ChildKind, ChildResource};
use crate::types::{ObjectKey, VsCode, VsCodeSpec};

/// One-shot fault consumed by the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Reading any descriptor fails.
    DescriptorReadFails,
    /// Reading any secret fails.
    SecretReadFails,
    /// Reading the child fails.
    ReadFails(ChildKind),
    /// Creating the child fails.
    CreateFails(ChildKind),
    /// Another writer creates the child between our read and our create.
    CreateRace(ChildKind),
}

#[derive(Default)]
struct ClusterInner {
    descriptors: HashMap<ObjectKey, VsCode>,
    secrets: HashSet<(String, String)>,
    children: HashMap<String, BTreeMap<ChildKind, ChildResource>>,
    journal: Vec<(String, ChildKind)>,
    faults: Vec<Fault>,
    next_uid: u64,
}

impl ClusterInner {
    fn take_fault(&mut self, fault: &Fault) -> bool {
        self.faults
            .iter()
            .position(|f| f == fault)
            .map(|pos| self.faults.remove(pos))
            .is_some()
    }
}

/// In-memory cluster state.
#[derive(Default, Clone)]
pub struct InMemoryCluster {
    inner: Arc<RwLock<ClusterInner>>,
}

impl InMemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a descriptor with a fresh UID and return its key.
    pub async fn add_descriptor(
        &self,
        namespace: &str,
        name: &str,
        spec: VsCodeSpec,
    ) -> ObjectKey {
        let mut inner = self.inner.write().await;
        inner.next_uid = inner.next_uid.saturating_add(1);

        let mut vscode = VsCode::new(name, spec);
        vscode.metadata.namespace = Some(namespace.to_string());
        vscode.metadata.uid = Some(format!("uid-{}", inner.next_uid));

        let key = ObjectKey::new(namespace, name);
        inner.descriptors.insert(key.clone(), vscode);
        key
    }

    /// Store a descriptor exactly as given.
    pub async fn insert_descriptor(&self, key: ObjectKey, vscode: VsCode) {
        self.inner.write().await.descriptors.insert(key, vscode);
    }

    /// Delete a descriptor. Children are left alone; garbage collection is
    /// the platform's job.
    pub async fn remove_descriptor(&self, key: &ObjectKey) {
        self.inner.write().await.descriptors.remove(key);
    }

    /// Store a secret.
    pub async fn add_secret(&self, namespace: &str, name: &str) {
        self.inner
            .write()
            .await
            .secrets
            .insert((namespace.to_string(), name.to_string()));
    }

    /// Delete a child behind the reconciler's back.
    pub async fn remove_child(&self, namespace: &str, kind: ChildKind) -> Option<ChildResource> {
        self.inner
            .write()
            .await
            .children
            .get_mut(namespace)
            .and_then(|children| children.remove(&kind))
    }

    /// Queue a one-shot fault.
    pub async fn inject(&self, fault: Fault) {
        self.inner.write().await.faults.push(fault);
    }

    /// Children in `namespace`, in creation order.
    pub async fn children(&self, namespace: &str) -> Vec<ChildResource> {
        self.inner
            .read()
            .await
            .children
            .get(namespace)
            .map(|children| children.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A single child, if present.
    pub async fn child(&self, namespace: &str, kind: ChildKind) -> Option<ChildResource> {
        self.inner
            .read()
            .await
            .children
            .get(namespace)
            .and_then(|children| children.get(&kind).cloned())
    }

    /// Every successful create performed through [`Cluster::create_child`],
    /// oldest first.
    pub async fn journal(&self) -> Vec<(String, ChildKind)> {
        self.inner.read().await.journal.clone()
    }
}

#[async_trait]
impl Cluster for InMemoryCluster {
    async fn get_descriptor(&self, key: &ObjectKey) -> Result<Option<VsCode>> {
        let mut inner = self.inner.write().await;
        if inner.take_fault(&Fault::DescriptorReadFails) {
            return Err(Error::cluster_unavailable(
                format!("get VsCode/{}", key.name),
                "injected read failure",
            ));
        }
        Ok(inner.descriptors.get(key).cloned())
    }

    async fn secret_presence(&self, namespace: &str, name: &str) -> Result<Presence> {
        let mut inner = self.inner.write().await;
        if inner.take_fault(&Fault::SecretReadFails) {
            return Err(Error::cluster_unavailable(
                format!("get Secret/{name}"),
                "injected read failure",
            ));
        }
        let found = inner
            .secrets
            .contains(&(namespace.to_string(), name.to_string()));
        Ok(Presence::from(found))
    }

    async fn child_presence(&self, namespace: &str, kind: ChildKind) -> Result<Presence> {
        let mut inner = self.inner.write().await;
        if inner.take_fault(&Fault::ReadFails(kind)) {
            return Err(Error::cluster_unavailable(
                format!("get {kind}"),
                "injected read failure",
            ));
        }
        let found = inner
            .children
            .get(namespace)
            .is_some_and(|children| children.contains_key(&kind));
        Ok(Presence::from(found))
    }

    async fn create_child(&self, namespace: &str, child: &ChildResource) -> Result<CreateOutcome> {
        let kind = child.kind();
        let mut inner = self.inner.write().await;

        if inner.take_fault(&Fault::CreateFails(kind)) {
            return Err(Error::cluster_unavailable(
                format!("create {kind}"),
                "injected create failure",
            ));
        }

        if inner.take_fault(&Fault::CreateRace(kind)) {
            inner
                .children
                .entry(namespace.to_string())
                .or_default()
                .insert(kind, child.clone());
            return Ok(CreateOutcome::AlreadyExists);
        }

        let children = inner.children.entry(namespace.to_string()).or_default();
        if children.contains_key(&kind) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        children.insert(kind, child.clone());
        inner.journal.push((namespace.to_string(), kind));
        Ok(CreateOutcome::Created)
    }
}
