//! Kubernetes API store adapter
//!
//! Implements every store port on top of a `kube::Client`.

use crate::crd::{
    Infrastructure, MachineConfig, MachineConfigPool, SriovNetworkNodePolicy, SriovNetworkNodeState,
    SriovOperatorConfig, INFRASTRUCTURE_NAME,
};
use crate::domain::ports::{InfrastructureReader, MachineConfigStore, NodeReader, SriovReader};
use crate::domain::selector;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn pools(&self) -> Api<MachineConfigPool> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl NodeReader for KubeStore {
    async fn list_nodes(&self, selector: &LabelSelector) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let query = selector::to_query(selector)?;

        let mut params = ListParams::default();
        if !query.is_empty() {
            params = params.labels(&query);
        }

        debug!("Listing nodes with selector {:?}", query);
        Ok(api.list(&params).await?.items)
    }
}

#[async_trait]
impl SriovReader for KubeStore {
    async fn list_node_states(&self, namespace: &str) -> Result<Vec<SriovNetworkNodeState>> {
        let api: Api<SriovNetworkNodeState> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_node_policies(&self, namespace: &str) -> Result<Vec<SriovNetworkNodePolicy>> {
        let api: Api<SriovNetworkNodePolicy> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_operator_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SriovOperatorConfig>> {
        let api: Api<SriovOperatorConfig> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl MachineConfigStore for KubeStore {
    async fn get_machine_config(&self, name: &str) -> Result<MachineConfig> {
        let api: Api<MachineConfig> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn get_pool(&self, name: &str) -> Result<MachineConfigPool> {
        Ok(self.pools().get(name).await?)
    }

    async fn set_pool_paused(&self, name: &str, paused: bool) -> Result<MachineConfigPool> {
        info!("Changing machine config pool {} pause to {}", name, paused);

        let patch = json!({ "spec": { "paused": paused } });
        Ok(self
            .pools()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn annotate_pool(
        &self,
        pool: &MachineConfigPool,
        key: &str,
        value: &str,
    ) -> Result<MachineConfigPool> {
        let name = pool.name_any();
        info!("Annotating machine config pool {} with {}={}", name, key, value);

        // resourceVersion turns the merge patch into a conditional write
        let patch = json!({
            "metadata": {
                "resourceVersion": pool.resource_version(),
                "annotations": { key: value },
            }
        });
        Ok(self
            .pools()
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}

#[async_trait]
impl InfrastructureReader for KubeStore {
    async fn get_infrastructure(&self) -> Result<Option<Infrastructure>> {
        let api: Api<Infrastructure> = Api::all(self.client.clone());
        Ok(api.get_opt(INFRASTRUCTURE_NAME).await?)
    }
}
