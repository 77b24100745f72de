//! [`Cluster`] backed by the Kubernetes API server.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::api::PostParams;
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{Cluster, CreateOutcome, Presence};
use crate::error::Result;
use crate::istio::{DestinationRule, VirtualService};
use crate::templates::{ChildKind, ChildResource};
use crate::types::{ObjectKey, VsCode};

const HTTP_CONFLICT: u16 = 409;

/// Cluster access through a [`kube::Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an existing client.
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient kubeconfig or in-cluster environment.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable configuration is found.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Underlying client.
    pub const fn client(&self) -> &Client {
        &self.client
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn presence<K>(&self, namespace: &str, name: &str) -> Result<Presence>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let found = self
            .api::<K>(namespace)
            .get_metadata_opt(name)
            .await?
            .is_some();
        debug!(namespace, name, found, "Checked object presence");
        Ok(Presence::from(found))
    }

    async fn create<K>(&self, namespace: &str, object: &K) -> Result<CreateOutcome>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        match self
            .api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
        {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(response)) if response.code == HTTP_CONFLICT => {
                info!(
                    namespace,
                    name = ?object.meta().name,
                    reason = %response.message,
                    "Object already exists"
                );
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get_descriptor(&self, key: &ObjectKey) -> Result<Option<VsCode>> {
        Ok(self.api::<VsCode>(&key.namespace).get_opt(&key.name).await?)
    }

    async fn secret_presence(&self, namespace: &str, name: &str) -> Result<Presence> {
        self.presence::<Secret>(namespace, name).await
    }

    async fn child_presence(&self, namespace: &str, kind: ChildKind) -> Result<Presence> {
        let name = kind.object_name();
        match kind {
            ChildKind::Pod => self.presence::<Pod>(namespace, name).await,
            ChildKind::UiService | ChildKind::ApiService => {
                self.presence::<Service>(namespace, name).await
            }
            ChildKind::VirtualService => self.presence::<VirtualService>(namespace, name).await,
            ChildKind::DestinationRule => self.presence::<DestinationRule>(namespace, name).await,
        }
    }

    async fn create_child(&self, namespace: &str, child: &ChildResource) -> Result<CreateOutcome> {
        match child {
            ChildResource::Pod(pod) => self.create(namespace, pod).await,
            ChildResource::Service(_, service) => self.create(namespace, service).await,
            ChildResource::VirtualService(vs) => self.create(namespace, vs).await,
            ChildResource::DestinationRule(dr) => self.create(namespace, dr).await,
        }
    }
}
