//! Drain coordination with OpenShift machine config pools
//!
//! The machine config operator reboots nodes of a pool one by one while it
//! rolls out a rendered configuration. Draining a node for SR-IOV changes at
//! the same time would stack two disruptions, so the coordinator pauses the
//! node's pool before a drain and unpauses it once the last draining node of
//! the pool is done. The pool carries a marker annotation so that several
//! coordinators agree on who paused it.
//!
//! Decision table for `before_drain`:
//!
//! | marker          | paused | rollout in sync | action                          | result |
//! |-----------------|--------|-----------------|---------------------------------|--------|
//! | Paused          | yes    | -               | none                            | true   |
//! | Paused          | no     | no              | none                            | false  |
//! | Paused          | no     | yes             | pause                           | true   |
//! | absent or Idle  | -      | no              | none                            | false  |
//! | absent or Idle  | -      | yes             | mark Paused, pause, re-check    | true   |
//!
//! When the re-check finds a rollout that started meanwhile, the pause is
//! reverted and the marker reset to Idle, and the result is `false`.

use super::platform::ClusterPlatform;
use crate::crd::{
    MachineConfigPool, DESIRED_MACHINE_CONFIG_ANNOTATION, STATE_ANNOTATION, STATE_IDLE,
    STATE_PAUSED,
};
use crate::domain::ports::ClusterStoreRef;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Coordinates node drains with the pool rollout of its platform
pub struct DrainCoordinator {
    store: ClusterStoreRef,
    platform: ClusterPlatform,
    /// Serializes the read-decide-write sections of this process
    pause_lock: Mutex<()>,
}

impl DrainCoordinator {
    /// Create a coordinator for an already detected platform
    pub fn new(store: ClusterStoreRef, platform: ClusterPlatform) -> Self {
        Self {
            store,
            platform,
            pause_lock: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> ClusterPlatform {
        self.platform
    }

    /// Prepare the node's pool for a drain.
    ///
    /// Returns `true` when the drain may proceed. `false` means the pool is
    /// rolling out and the caller should retry later.
    pub async fn before_drain(&self, node: &Node) -> Result<bool> {
        if !self.platform.uses_machine_config_pools() {
            return Ok(true);
        }

        let pool_name = self.node_pool_name(node).await?;
        let _guard = self.pause_lock.lock().await;

        let pool = self.store.get_pool(&pool_name).await?;
        if pool.annotation(STATE_ANNOTATION) == Some(STATE_PAUSED) {
            if pool.spec.paused {
                debug!("Machine config pool {} already paused for drain", pool_name);
                return Ok(true);
            }
            if !pool.rollout_in_sync() {
                info!(
                    "Machine config pool {} is rolling out {} -> {}, waiting",
                    pool_name,
                    pool.current_config(),
                    pool.desired_config()
                );
                return Ok(false);
            }
            self.store.set_pool_paused(&pool_name, true).await?;
            return Ok(true);
        }

        if !pool.rollout_in_sync() {
            info!(
                "Machine config pool {} is rolling out {} -> {}, waiting",
                pool_name,
                pool.current_config(),
                pool.desired_config()
            );
            return Ok(false);
        }

        info!("Pausing machine config pool {} for drain of node {}", pool_name, node.name_any());
        self.store
            .annotate_pool(&pool, STATE_ANNOTATION, STATE_PAUSED)
            .await?;
        self.store.set_pool_paused(&pool_name, true).await?;

        // A rollout may have started between the read and the pause
        let pool = self.store.get_pool(&pool_name).await?;
        if !pool.rollout_in_sync() {
            warn!(
                "Machine config pool {} started rolling out while pausing, reverting",
                pool_name
            );
            self.revert_pause(&pool_name).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Release the node's pool after a drain.
    ///
    /// Returns `true` once the pool is released or was never held. `false`
    /// means another node of the pool is still draining and will release it.
    pub async fn after_drain(&self, node: &Node) -> Result<bool> {
        if !self.platform.uses_machine_config_pools() {
            return Ok(true);
        }

        let pool_name = self.node_pool_name(node).await?;
        let _guard = self.pause_lock.lock().await;

        let pool = self.store.get_pool(&pool_name).await?;
        match pool.annotation(STATE_ANNOTATION) {
            None | Some(STATE_IDLE) => return Ok(true),
            Some(_) => {}
        }

        if let Some(draining) = self.other_draining_node(&pool, node).await? {
            info!(
                "Node {} of machine config pool {} is still draining, leaving the pool paused",
                draining, pool_name
            );
            return Ok(false);
        }

        info!("Releasing machine config pool {} after drain of node {}", pool_name, node.name_any());
        let pool = self.store.set_pool_paused(&pool_name, false).await?;
        self.store
            .annotate_pool(&pool, STATE_ANNOTATION, STATE_IDLE)
            .await?;
        Ok(true)
    }

    /// Name of the machine config pool that owns the node's desired config
    pub async fn node_pool_name(&self, node: &Node) -> Result<String> {
        let node_name = node.name_any();
        let Some(desired) = node.annotations().get(DESIRED_MACHINE_CONFIG_ANNOTATION) else {
            return Err(Error::PoolLookup {
                node: node_name,
                reason: format!(
                    "failed to find the annotation [{}]",
                    DESIRED_MACHINE_CONFIG_ANNOTATION
                ),
            });
        };

        let mc = self.store.get_machine_config(desired).await?;
        match mc.owning_pool() {
            Some(pool) => Ok(pool.to_string()),
            None => Err(Error::PoolLookup {
                node: node_name,
                reason: format!("machine config {} has no owning pool", desired),
            }),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// First node of the pool, other than `node`, whose drain marker is not idle
    async fn other_draining_node(
        &self,
        pool: &MachineConfigPool,
        node: &Node,
    ) -> Result<Option<String>> {
        let Some(selector) = pool.spec.node_selector.as_ref() else {
            return Ok(None);
        };

        let own_name = node.name_any();
        let members = self.store.list_nodes(selector).await?;
        Ok(members
            .iter()
            .filter(|n| n.name_any() != own_name)
            .find(|n| match n.annotations().get(STATE_ANNOTATION) {
                Some(state) => state != STATE_IDLE,
                None => false,
            })
            .map(|n| n.name_any()))
    }

    /// Undo a pause that raced with a rollout. Best effort: a failure is
    /// returned to the caller, who retries the whole drain later.
    async fn revert_pause(&self, pool_name: &str) -> Result<()> {
        let pool = self.store.set_pool_paused(pool_name, false).await?;
        self.store
            .annotate_pool(&pool, STATE_ANNOTATION, STATE_IDLE)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        MachineConfig, MachineConfigPoolSpec, MachineConfigPoolStatus, MachineConfigSpec,
        RenderedConfiguration,
    };
    use crate::drain::platform::OpenShiftFlavor;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
    use crate::crd::{
        Infrastructure, SriovNetworkNodePolicy, SriovNetworkNodeState, SriovOperatorConfig,
    };
    use crate::domain::ports::{InfrastructureReader, MachineConfigStore, NodeReader, SriovReader};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const POOL: &str = "worker";
    const RENDERED: &str = "rendered-worker-1";

    fn node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.metadata.labels = Some(BTreeMap::from([(
            "node-role.kubernetes.io/worker".to_string(),
            String::new(),
        )]));
        node.metadata.annotations = Some(BTreeMap::from([(
            DESIRED_MACHINE_CONFIG_ANNOTATION.to_string(),
            RENDERED.to_string(),
        )]));
        node
    }

    fn pool(desired: &str, current: &str) -> MachineConfigPool {
        let mut pool = MachineConfigPool::new(
            POOL,
            MachineConfigPoolSpec {
                node_selector: Some(LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "node-role.kubernetes.io/worker".to_string(),
                        String::new(),
                    )])),
                    ..Default::default()
                }),
                paused: false,
                configuration: RenderedConfiguration {
                    name: desired.to_string(),
                },
            },
        );
        pool.status = Some(MachineConfigPoolStatus {
            configuration: RenderedConfiguration {
                name: current.to_string(),
            },
            ..Default::default()
        });
        pool
    }

    fn machine_config() -> MachineConfig {
        let mut mc = MachineConfig::new(RENDERED, MachineConfigSpec::default());
        mc.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "machineconfiguration.openshift.io/v1".into(),
            kind: "MachineConfigPool".into(),
            name: POOL.into(),
            uid: "uid-1".into(),
            ..Default::default()
        }]);
        mc
    }

    fn setup(nodes: &[&str]) -> (Arc<MemoryStore>, DrainCoordinator) {
        let store = Arc::new(MemoryStore::new());
        for name in nodes {
            store.put_node(node(name));
        }
        store.put_machine_config(machine_config());
        store.put_pool(pool(RENDERED, RENDERED));

        let coordinator = DrainCoordinator::new(
            store.clone(),
            ClusterPlatform::OpenShift(OpenShiftFlavor::Default),
        );
        (store, coordinator)
    }

    type ReadHook = Box<dyn Fn(&MemoryStore) + Send + Sync>;
    type PauseHook = Box<dyn Fn(&MemoryStore, bool) + Send + Sync>;

    /// MemoryStore that lets a test change the cluster between the
    /// coordinator's reads and writes
    struct HookedStore {
        inner: Arc<MemoryStore>,
        after_get_pool: Option<ReadHook>,
        after_set_paused: Option<PauseHook>,
        annotate_calls: AtomicU64,
    }

    impl HookedStore {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                after_get_pool: None,
                after_set_paused: None,
                annotate_calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl NodeReader for HookedStore {
        async fn list_nodes(&self, selector: &LabelSelector) -> Result<Vec<Node>> {
            self.inner.list_nodes(selector).await
        }
    }

    #[async_trait]
    impl SriovReader for HookedStore {
        async fn list_node_states(&self, namespace: &str) -> Result<Vec<SriovNetworkNodeState>> {
            self.inner.list_node_states(namespace).await
        }

        async fn list_node_policies(&self, namespace: &str) -> Result<Vec<SriovNetworkNodePolicy>> {
            self.inner.list_node_policies(namespace).await
        }

        async fn get_operator_config(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<SriovOperatorConfig>> {
            self.inner.get_operator_config(namespace, name).await
        }
    }

    #[async_trait]
    impl MachineConfigStore for HookedStore {
        async fn get_machine_config(&self, name: &str) -> Result<MachineConfig> {
            self.inner.get_machine_config(name).await
        }

        async fn get_pool(&self, name: &str) -> Result<MachineConfigPool> {
            let pool = self.inner.get_pool(name).await?;
            if let Some(hook) = &self.after_get_pool {
                hook(&self.inner);
            }
            Ok(pool)
        }

        async fn set_pool_paused(&self, name: &str, paused: bool) -> Result<MachineConfigPool> {
            let pool = self.inner.set_pool_paused(name, paused).await?;
            if let Some(hook) = &self.after_set_paused {
                hook(&self.inner, paused);
            }
            Ok(pool)
        }

        async fn annotate_pool(
            &self,
            pool: &MachineConfigPool,
            key: &str,
            value: &str,
        ) -> Result<MachineConfigPool> {
            self.annotate_calls.fetch_add(1, Ordering::Relaxed);
            self.inner.annotate_pool(pool, key, value).await
        }
    }

    #[async_trait]
    impl InfrastructureReader for HookedStore {
        async fn get_infrastructure(&self) -> Result<Option<Infrastructure>> {
            self.inner.get_infrastructure().await
        }
    }

    fn openshift(store: Arc<HookedStore>) -> DrainCoordinator {
        DrainCoordinator::new(store, ClusterPlatform::OpenShift(OpenShiftFlavor::Default))
    }

    #[tokio::test]
    async fn test_non_openshift_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = DrainCoordinator::new(store.clone(), ClusterPlatform::Kubernetes);

        assert!(coordinator.before_drain(&node("a")).await.unwrap());
        assert!(coordinator.after_drain(&node("a")).await.unwrap());

        let hosted = DrainCoordinator::new(
            store.clone(),
            ClusterPlatform::OpenShift(OpenShiftFlavor::Hypershift),
        );
        assert!(hosted.before_drain(&node("a")).await.unwrap());
        assert_eq!(store.pool_writes(), 0);
    }

    #[tokio::test]
    async fn test_before_drain_pauses_idle_pool() {
        let (store, coordinator) = setup(&["a"]);

        assert!(coordinator.before_drain(&node("a")).await.unwrap());

        let pool = store.pool(POOL).unwrap();
        assert!(pool.spec.paused);
        assert_eq!(pool.annotation(STATE_ANNOTATION), Some(STATE_PAUSED));
        assert_eq!(store.pool_writes(), 2);
    }

    #[tokio::test]
    async fn test_before_drain_twice_writes_once() {
        let (store, coordinator) = setup(&["a"]);

        assert!(coordinator.before_drain(&node("a")).await.unwrap());
        let writes = store.pool_writes();
        assert!(coordinator.before_drain(&node("a")).await.unwrap());
        assert_eq!(store.pool_writes(), writes);
    }

    #[tokio::test]
    async fn test_before_drain_waits_for_rollout() {
        let (store, coordinator) = setup(&["a"]);
        store.put_pool(pool("rendered-worker-2", RENDERED));

        assert!(!coordinator.before_drain(&node("a")).await.unwrap());
        assert_eq!(store.pool_writes(), 0);
        assert!(!store.pool(POOL).unwrap().spec.paused);
    }

    #[tokio::test]
    async fn test_before_drain_reverts_when_rollout_starts_during_pause() {
        let (memory, _) = setup(&["a"]);
        let mut hooked = HookedStore::new(memory.clone());
        hooked.after_set_paused = Some(Box::new(|store, paused| {
            if paused {
                store.update_pool(POOL, |p| {
                    p.spec.configuration.name = "rendered-worker-2".to_string();
                });
            }
        }));
        let hooked = Arc::new(hooked);
        let coordinator = openshift(hooked.clone());

        assert!(!coordinator.before_drain(&node("a")).await.unwrap());

        let pool = memory.pool(POOL).unwrap();
        assert!(!pool.spec.paused);
        assert_eq!(pool.annotation(STATE_ANNOTATION), Some(STATE_IDLE));
        // mark Paused, then reset to Idle
        assert_eq!(hooked.annotate_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_stale_pool_write_is_a_conflict() {
        let (memory, _) = setup(&["a"]);
        let mut hooked = HookedStore::new(memory.clone());
        // another writer updates the pool right after every read
        hooked.after_get_pool = Some(Box::new(|store| {
            store.update_pool(POOL, |p| {
                p.labels_mut().insert("touched".to_string(), "yes".to_string());
            });
        }));
        let hooked = Arc::new(hooked);
        let coordinator = openshift(hooked.clone());

        assert_matches!(
            coordinator.before_drain(&node("a")).await,
            Err(Error::StoreConflict { .. })
        );

        assert_eq!(hooked.annotate_calls.load(Ordering::Relaxed), 1);
        assert_eq!(memory.pool_writes(), 0);
        let pool = memory.pool(POOL).unwrap();
        assert!(!pool.spec.paused);
        assert_eq!(pool.annotation(STATE_ANNOTATION), None);
    }

    #[tokio::test]
    async fn test_before_drain_repauses_marked_pool() {
        let (store, coordinator) = setup(&["a"]);
        store.update_pool(POOL, |p| {
            p.annotations_mut()
                .insert(STATE_ANNOTATION.to_string(), STATE_PAUSED.to_string());
        });

        assert!(coordinator.before_drain(&node("a")).await.unwrap());
        assert!(store.pool(POOL).unwrap().spec.paused);
        assert_eq!(store.pool_writes(), 1);
    }

    #[tokio::test]
    async fn test_marked_pool_in_rollout_is_not_paused() {
        let (store, coordinator) = setup(&["a"]);
        store.put_pool(pool("rendered-worker-2", RENDERED));
        store.update_pool(POOL, |p| {
            p.annotations_mut()
                .insert(STATE_ANNOTATION.to_string(), STATE_PAUSED.to_string());
        });

        assert!(!coordinator.before_drain(&node("a")).await.unwrap());
        assert_eq!(store.pool_writes(), 0);
    }

    #[tokio::test]
    async fn test_last_finisher_releases_pool() {
        let (store, coordinator) = setup(&["a", "b"]);
        store.set_node_annotation("a", STATE_ANNOTATION, Some("Draining"));
        store.set_node_annotation("b", STATE_ANNOTATION, Some("Draining"));

        assert!(coordinator.before_drain(&node("a")).await.unwrap());
        assert!(coordinator.before_drain(&node("b")).await.unwrap());

        // a finishes first while b still drains
        store.set_node_annotation("a", STATE_ANNOTATION, Some(STATE_IDLE));
        assert!(!coordinator.after_drain(&node("a")).await.unwrap());
        assert!(store.pool(POOL).unwrap().spec.paused);

        store.set_node_annotation("b", STATE_ANNOTATION, Some(STATE_IDLE));
        assert!(coordinator.after_drain(&node("b")).await.unwrap());

        let pool = store.pool(POOL).unwrap();
        assert!(!pool.spec.paused);
        assert_eq!(pool.annotation(STATE_ANNOTATION), Some(STATE_IDLE));
    }

    #[tokio::test]
    async fn test_after_drain_on_idle_pool_is_noop() {
        let (store, coordinator) = setup(&["a"]);
        assert!(coordinator.after_drain(&node("a")).await.unwrap());
        assert_eq!(store.pool_writes(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_before_drain_pauses_once() {
        let (store, coordinator) = setup(&["a", "b"]);
        let coordinator = Arc::new(coordinator);

        let first = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.before_drain(&node("a")).await })
        };
        let second = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.before_drain(&node("b")).await })
        };

        assert!(first.await.unwrap().unwrap());
        assert!(second.await.unwrap().unwrap());
        // annotate + pause once, the second caller sees the pool already held
        assert_eq!(store.pool_writes(), 2);
    }

    #[tokio::test]
    async fn test_missing_desired_config_annotation() {
        let (_store, coordinator) = setup(&["a"]);
        let mut bare = node("a");
        bare.metadata.annotations = None;

        assert_matches!(
            coordinator.before_drain(&bare).await,
            Err(Error::PoolLookup { .. })
        );
    }

    #[tokio::test]
    async fn test_store_errors_are_surfaced() {
        let (store, coordinator) = setup(&["a"]);
        store.set_unavailable(true);
        assert_matches!(coordinator.before_drain(&node("a")).await, Err(Error::Kube(_)));
    }
}
