//! How coordinators talk to storage nodes
//!
//! [`NodeClient`] is the seam between the replication logic and the wire.
//! In-process clusters use [`LocalClient`]; the daemon provides an HTTP
//! implementation. Every call may fail with `Unavailable` when the node
//! cannot be reached.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::ledger::{NodeId, ObjectId, OwnershipRecord};
use crate::node::{LockReply, NodeInfo, StorageNode};
use crate::object::{Absorbed, ObjectRecord};

#[async_trait]
pub trait NodeClient: Send + Sync + Debug + 'static {
    fn id(&self) -> NodeId;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn info(&self) -> Result<NodeInfo, StoreError>;

    async fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError>;

    async fn lock(&self, id: &ObjectId, token: u64, base_version: u64)
        -> Result<LockReply, StoreError>;

    async fn unlock(&self, id: &ObjectId, token: u64) -> Result<(), StoreError>;

    async fn store(&self, record: &ObjectRecord, token: Option<u64>)
        -> Result<Absorbed, StoreError>;

    async fn set_ownership(
        &self,
        id: &ObjectId,
        ownership: &OwnershipRecord,
    ) -> Result<bool, StoreError>;

    async fn remove(&self, id: &ObjectId) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<ObjectId>, StoreError>;
}

/// Where a [`Membership`] learns about nodes that joined after it was built
#[async_trait]
pub trait PeerDiscovery: Send + Sync + Debug + 'static {
    /// Every node the cluster currently knows about
    async fn discover(&self) -> Result<Vec<Arc<dyn NodeClient>>, StoreError>;
}

/// Direct handle on an in-process node
///
/// Reachability can be switched off to simulate a partition or a crashed
/// process without touching the node's storage.
#[derive(Debug, Clone)]
pub struct LocalClient {
    node: StorageNode,
    reachable: Arc<AtomicBool>,
}

impl LocalClient {
    pub fn new(node: StorageNode) -> Self {
        Self {
            node,
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn node(&self) -> &StorageNode {
        &self.node
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(StoreError::unavailable(format!(
                "node {} unreachable",
                self.node.id().short()
            )))
        }
    }
}

#[async_trait]
impl NodeClient for LocalClient {
    fn id(&self) -> NodeId {
        self.node.id()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn info(&self) -> Result<NodeInfo, StoreError> {
        self.check()?;
        Ok(self.node.info())
    }

    async fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        self.check()?;
        self.node.fetch(id).await
    }

    async fn lock(
        &self,
        id: &ObjectId,
        token: u64,
        base_version: u64,
    ) -> Result<LockReply, StoreError> {
        self.check()?;
        self.node.lock(id, token, base_version).await
    }

    async fn unlock(&self, id: &ObjectId, token: u64) -> Result<(), StoreError> {
        self.check()?;
        self.node.unlock(id, token).await;
        Ok(())
    }

    async fn store(
        &self,
        record: &ObjectRecord,
        token: Option<u64>,
    ) -> Result<Absorbed, StoreError> {
        self.check()?;
        self.node.store(record.clone(), token).await
    }

    async fn set_ownership(
        &self,
        id: &ObjectId,
        ownership: &OwnershipRecord,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.node.set_ownership(id, ownership.clone()).await
    }

    async fn remove(&self, id: &ObjectId) -> Result<bool, StoreError> {
        self.check()?;
        self.node.remove(id).await
    }

    async fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        self.check()?;
        self.node.list().await
    }
}

/// Minimum spacing between two discovery rounds
const MIN_REFRESH_GAP: Duration = Duration::from_millis(500);

/// The set of storage nodes a mount or repair tool knows about
///
/// Cloning shares the same view. A membership built with a
/// [`PeerDiscovery`] source can [`refresh`](Membership::refresh) itself, so
/// a long running mount sees nodes that join or are evicted after it
/// started.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    nodes: Arc<RwLock<BTreeMap<NodeId, Arc<dyn NodeClient>>>>,
    discovery: Option<Arc<dyn PeerDiscovery>>,
    refreshed: Arc<tokio::sync::Mutex<Option<Instant>>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_clients(clients: impl IntoIterator<Item = Arc<dyn NodeClient>>) -> Self {
        let membership = Self::new();
        for client in clients {
            membership.insert(client);
        }
        membership
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn PeerDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn insert(&self, client: Arc<dyn NodeClient>) -> bool {
        self.nodes.write().insert(client.id(), client).is_none()
    }

    pub fn remove(&self, id: &NodeId) -> Option<Arc<dyn NodeClient>> {
        self.nodes.write().remove(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<dyn NodeClient>> {
        self.nodes.read().get(id).cloned()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.read().keys().copied().collect()
    }

    pub fn clients(&self) -> Vec<Arc<dyn NodeClient>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Nodes that answer a ping, in id order
    pub async fn reachable(&self) -> Vec<Arc<dyn NodeClient>> {
        let clients = self.clients();
        let pings = futures::future::join_all(clients.iter().map(|c| c.ping())).await;
        clients
            .into_iter()
            .zip(pings)
            .filter_map(|(client, ping)| ping.ok().map(|_| client))
            .collect()
    }

    /// Re-read the member set from the discovery source
    ///
    /// Nodes the source no longer reports are dropped and new ones added.
    /// Returns the number of nodes added; without a source, or when the
    /// last round is too recent, nothing happens.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let Some(discovery) = &self.discovery else {
            return Ok(0);
        };
        let mut last = self.refreshed.lock().await;
        if last.is_some_and(|at| at.elapsed() < MIN_REFRESH_GAP) {
            return Ok(0);
        }
        let clients = discovery.discover().await?;
        *last = Some(Instant::now());
        Ok(self.sync(clients))
    }

    fn sync(&self, clients: Vec<Arc<dyn NodeClient>>) -> usize {
        if clients.is_empty() {
            return 0;
        }
        let reported: BTreeSet<NodeId> = clients.iter().map(|c| c.id()).collect();
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|id, _| reported.contains(id));
        let dropped = before - nodes.len();

        // known nodes take the fresh handle too, it may carry a new address
        let mut added = 0;
        for client in clients {
            if nodes.insert(client.id(), client).is_none() {
                added += 1;
            }
        }
        if added > 0 || dropped > 0 {
            tracing::info!(added, dropped, members = nodes.len(), "membership refreshed");
        }
        added
    }

    /// Refresh from the discovery source every `period`
    pub fn spawn_refresh(&self, period: Duration) -> JoinHandle<()> {
        let membership = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = membership.refresh().await {
                    tracing::warn!(error = %e, "membership refresh failed");
                }
            }
        })
    }
}

/// A membership serves as the discovery source of another view
#[async_trait]
impl PeerDiscovery for Membership {
    async fn discover(&self) -> Result<Vec<Arc<dyn NodeClient>>, StoreError> {
        Ok(self.clients())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_client() {
        let client = LocalClient::new(StorageNode::memory(3));
        client.ping().await.unwrap();
        client.set_reachable(false);
        assert!(matches!(
            client.fetch(&ObjectId::generate()).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_membership_reachable() {
        let a = LocalClient::new(StorageNode::memory(3));
        let b = LocalClient::new(StorageNode::memory(3));
        b.set_reachable(false);
        let membership = Membership::from_clients([
            Arc::new(a.clone()) as Arc<dyn NodeClient>,
            Arc::new(b.clone()) as Arc<dyn NodeClient>,
        ]);
        assert_eq!(membership.len(), 2);
        let reachable = membership.reachable().await;
        assert_eq!(reachable.len(), 1);
        assert_eq!(reachable[0].id(), a.id());
    }

    #[tokio::test]
    async fn test_refresh_follows_source() {
        let a = LocalClient::new(StorageNode::memory(3));
        let b = LocalClient::new(StorageNode::memory(3));
        let source = Membership::from_clients([Arc::new(a.clone()) as Arc<dyn NodeClient>]);
        let view = Membership::from_clients([Arc::new(a.clone()) as Arc<dyn NodeClient>])
            .with_discovery(Arc::new(source.clone()));

        source.insert(Arc::new(b.clone()));
        assert!(!view.contains(&b.id()));
        assert_eq!(view.refresh().await.unwrap(), 1);
        assert!(view.contains(&b.id()));

        // rounds closer together than the gap are skipped
        source.remove(&a.id());
        assert_eq!(view.refresh().await.unwrap(), 0);
        assert!(view.contains(&a.id()));
        tokio::time::sleep(MIN_REFRESH_GAP).await;
        view.refresh().await.unwrap();
        assert!(!view.contains(&a.id()));
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_source() {
        let view = Membership::new();
        assert_eq!(view.refresh().await.unwrap(), 0);
        assert!(view.is_empty());
    }
}
