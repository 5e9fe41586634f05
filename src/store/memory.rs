//! In-memory store adapter
//!
//! Holds objects in process, stamps resource versions on every write and
//! enforces them on conditional writes the way the API server does. Used by
//! tests, benches and local experiments.

use crate::crd::{
    Infrastructure, MachineConfig, MachineConfigPool, SriovNetworkNodePolicy, SriovNetworkNodeState,
    SriovOperatorConfig,
};
use crate::domain::ports::{InfrastructureReader, MachineConfigStore, NodeReader, SriovReader};
use crate::domain::selector;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::error::ErrorResponse;
use kube::ResourceExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type NamespacedKey = (String, String);

fn key_of<K: ResourceExt>(obj: &K) -> NamespacedKey {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// In-process object store
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<BTreeMap<String, Node>>,
    node_states: RwLock<BTreeMap<NamespacedKey, SriovNetworkNodeState>>,
    policies: RwLock<BTreeMap<NamespacedKey, SriovNetworkNodePolicy>>,
    operator_configs: RwLock<BTreeMap<NamespacedKey, SriovOperatorConfig>>,
    machine_configs: RwLock<BTreeMap<String, MachineConfig>>,
    pools: RwLock<BTreeMap<String, MachineConfigPool>>,
    infrastructure: RwLock<Option<Infrastructure>>,
    /// Last issued resource version
    revision: AtomicU64,
    /// Pool writes issued through the MachineConfigStore port
    pool_writes: AtomicU64,
    /// Fail every port call as if the API server were unreachable
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::Kube(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "the server is currently unable to handle the request".into(),
                reason: "ServiceUnavailable".into(),
                code: 503,
            })));
        }
        Ok(())
    }

    /// Make every subsequent port call fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of pool writes performed through the port
    pub fn pool_writes(&self) -> u64 {
        self.pool_writes.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn put_node(&self, mut node: Node) {
        node.metadata.resource_version = Some(self.next_revision());
        self.nodes.write().insert(node.name_any(), node);
    }

    /// Set or clear an annotation on a stored node
    pub fn set_node_annotation(&self, node: &str, key: &str, value: Option<&str>) {
        let revision = self.next_revision();
        if let Some(n) = self.nodes.write().get_mut(node) {
            let annotations = n.annotations_mut();
            match value {
                Some(v) => {
                    annotations.insert(key.to_string(), v.to_string());
                }
                None => {
                    annotations.remove(key);
                }
            }
            n.metadata.resource_version = Some(revision);
        }
    }

    pub fn put_node_state(&self, mut state: SriovNetworkNodeState) {
        state.metadata.resource_version = Some(self.next_revision());
        self.node_states.write().insert(key_of(&state), state);
    }

    pub fn put_policy(&self, mut policy: SriovNetworkNodePolicy) {
        policy.metadata.resource_version = Some(self.next_revision());
        self.policies.write().insert(key_of(&policy), policy);
    }

    pub fn put_operator_config(&self, mut config: SriovOperatorConfig) {
        config.metadata.resource_version = Some(self.next_revision());
        self.operator_configs.write().insert(key_of(&config), config);
    }

    pub fn put_machine_config(&self, mut mc: MachineConfig) {
        mc.metadata.resource_version = Some(self.next_revision());
        self.machine_configs.write().insert(mc.name_any(), mc);
    }

    pub fn put_pool(&self, mut pool: MachineConfigPool) {
        pool.metadata.resource_version = Some(self.next_revision());
        self.pools.write().insert(pool.name_any(), pool);
    }

    /// Change a stored pool out of band, as another controller would
    pub fn update_pool(&self, name: &str, update: impl FnOnce(&mut MachineConfigPool)) {
        let revision = self.next_revision();
        if let Some(pool) = self.pools.write().get_mut(name) {
            update(pool);
            pool.metadata.resource_version = Some(revision);
        }
    }

    /// Read a stored pool without going through the port
    pub fn pool(&self, name: &str) -> Option<MachineConfigPool> {
        self.pools.read().get(name).cloned()
    }

    pub fn set_infrastructure(&self, infra: Option<Infrastructure>) {
        *self.infrastructure.write() = infra;
    }
}

#[async_trait]
impl NodeReader for MemoryStore {
    async fn list_nodes(&self, selector: &LabelSelector) -> Result<Vec<Node>> {
        self.check_available()?;
        Ok(self
            .nodes
            .read()
            .values()
            .filter(|n| selector::matches(selector, n.labels()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SriovReader for MemoryStore {
    async fn list_node_states(&self, namespace: &str) -> Result<Vec<SriovNetworkNodeState>> {
        self.check_available()?;
        Ok(self
            .node_states
            .read()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn list_node_policies(&self, namespace: &str) -> Result<Vec<SriovNetworkNodePolicy>> {
        self.check_available()?;
        Ok(self
            .policies
            .read()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn get_operator_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SriovOperatorConfig>> {
        self.check_available()?;
        Ok(self
            .operator_configs
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[async_trait]
impl MachineConfigStore for MemoryStore {
    async fn get_machine_config(&self, name: &str) -> Result<MachineConfig> {
        self.check_available()?;
        self.machine_configs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "MachineConfig".into(),
                name: name.into(),
            })
    }

    async fn get_pool(&self, name: &str) -> Result<MachineConfigPool> {
        self.check_available()?;
        self.pool(name).ok_or_else(|| Error::ResourceNotFound {
            kind: "MachineConfigPool".into(),
            name: name.into(),
        })
    }

    async fn set_pool_paused(&self, name: &str, paused: bool) -> Result<MachineConfigPool> {
        self.check_available()?;
        let revision = self.next_revision();
        let mut pools = self.pools.write();
        let pool = pools.get_mut(name).ok_or_else(|| Error::ResourceNotFound {
            kind: "MachineConfigPool".into(),
            name: name.into(),
        })?;

        pool.spec.paused = paused;
        pool.metadata.resource_version = Some(revision);
        self.pool_writes.fetch_add(1, Ordering::Relaxed);
        Ok(pool.clone())
    }

    async fn annotate_pool(
        &self,
        pool: &MachineConfigPool,
        key: &str,
        value: &str,
    ) -> Result<MachineConfigPool> {
        self.check_available()?;
        let name = pool.name_any();
        let revision = self.next_revision();
        let mut pools = self.pools.write();
        let stored = pools.get_mut(&name).ok_or_else(|| Error::ResourceNotFound {
            kind: "MachineConfigPool".into(),
            name: name.clone(),
        })?;

        if stored.resource_version() != pool.resource_version() {
            return Err(Error::StoreConflict {
                kind: "MachineConfigPool".into(),
                name,
                expected: pool.resource_version().unwrap_or_default(),
            });
        }

        stored
            .annotations_mut()
            .insert(key.to_string(), value.to_string());
        stored.metadata.resource_version = Some(revision);
        self.pool_writes.fetch_add(1, Ordering::Relaxed);
        Ok(stored.clone())
    }
}

#[async_trait]
impl InfrastructureReader for MemoryStore {
    async fn get_infrastructure(&self) -> Result<Option<Infrastructure>> {
        self.check_available()?;
        Ok(self.infrastructure.read().clone())
    }
}
