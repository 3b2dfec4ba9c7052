use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use super::node::TestNode;
use crate::config::ClusterConfig;
use crate::coordinator::Coordinator;
use crate::gateway::MountGateway;
use crate::identity::{Identity, IdentityProvider};
use crate::jobs::JobDispatcher;
use crate::ledger::NodeId;
use crate::repair::{spawn_resync_worker, RepairService};
use crate::transport::Membership;

/// A cluster of in-process storage nodes plus the mounts attached to it
///
/// Node slots keep their index across restarts and wipes, so tests can
/// refer to "node 0" before and after it changes identity.
pub struct TestCluster {
    dir: TempDir,
    config: ClusterConfig,
    membership: Membership,
    nodes: Vec<TestNode>,
    identities: IdentityProvider,
    workers: Vec<JoinHandle<()>>,
}

impl TestCluster {
    /// `count` nodes persisted under a temp dir
    pub async fn new(count: usize, replication: u8) -> Result<Self> {
        Self::build(count, ClusterConfig::with_replication(replication), true).await
    }

    /// `count` memory-only nodes; restarts keep data, wipes lose it
    pub async fn in_memory(count: usize, replication: u8) -> Result<Self> {
        Self::build(count, ClusterConfig::with_replication(replication), false).await
    }

    pub async fn build(count: usize, config: ClusterConfig, persistent: bool) -> Result<Self> {
        config.validate()?;
        let dir = tempfile::tempdir()?;
        let identities = IdentityProvider::new(dir.path().join("identities"));
        let mut cluster = Self {
            dir,
            config,
            membership: Membership::new(),
            nodes: Vec::new(),
            identities,
            workers: Vec::new(),
        };
        for _ in 0..count {
            cluster.add_node(persistent).await?;
        }
        tracing::info!(nodes = count, replication = cluster.config.replication, "test cluster up");
        Ok(cluster)
    }

    /// Start one more node and make it a member
    pub async fn add_node(&mut self, persistent: bool) -> Result<usize> {
        let index = self.nodes.len();
        let name = format!("node{}", index);
        let dir = persistent.then(|| self.dir.path().join(&name));
        let node = TestNode::new(name, dir, self.config.replication).await?;
        self.membership.insert(node.handle());
        self.nodes.push(node);
        Ok(index)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn identities(&self) -> &IdentityProvider {
        &self.identities
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id()).collect()
    }

    /// Slot index currently held by `id`
    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == *id)
    }

    fn identity(&self, alias: &str) -> Result<Identity> {
        Ok(self.identities.create(alias, &format!("{}-passphrase", alias))?)
    }

    fn coordinator(&mut self) -> Coordinator {
        let (jobs, receiver) = JobDispatcher::new();
        let repair = RepairService::new(Coordinator::new(
            self.membership.clone(),
            self.config.clone(),
            None,
        ));
        self.workers.push(spawn_resync_worker(repair, receiver));
        Coordinator::new(self.membership.clone(), self.config.clone(), Some(jobs))
    }

    /// First mount: initialise the store owned by `alias`
    pub async fn create_store(&mut self, alias: &str) -> Result<MountGateway> {
        let identity = self.identity(alias)?;
        let coordinator = self.coordinator();
        Ok(MountGateway::create_store(coordinator, identity, Some(self.identities.clone())).await?)
    }

    /// Another mount point over the existing store
    pub async fn mount(&mut self, alias: &str) -> Result<MountGateway> {
        let identity = self.identity(alias)?;
        let coordinator = self.coordinator();
        Ok(MountGateway::open(coordinator, identity, Some(self.identities.clone())).await?)
    }

    /// Out-of-band repair tool with its own view of the cluster
    pub fn repair(&self) -> RepairService {
        RepairService::new(Coordinator::new(
            self.membership.clone(),
            self.config.clone(),
            None,
        ))
    }

    pub fn stop_node(&self, index: usize) {
        self.nodes[index].stop();
    }

    pub async fn restart_node(&mut self, index: usize) -> Result<()> {
        let node = &mut self.nodes[index];
        node.restart().await?;
        self.membership.insert(node.handle());
        Ok(())
    }

    /// Wipe a node's storage and bring it back under a fresh identity
    ///
    /// The old identity stays in the membership (unreachable) until it is
    /// evicted, the same as a real cluster that has not been repaired yet.
    pub async fn wipe_node(&mut self, index: usize) -> Result<NodeId> {
        let node = &mut self.nodes[index];
        let old = node.id();
        node.wipe().await?;
        node.restart().await?;
        if node.id() == old {
            return Err(anyhow!("wiped node kept its identity"));
        }
        self.membership.insert(node.handle());
        Ok(node.id())
    }

    /// Poll `condition` until it holds or `timeout` passes
    pub async fn wait_for<F, Fut>(&self, timeout: Duration, mut condition: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        loop {
            if condition().await {
                tracing::debug!("condition met after {:?}", start.elapsed());
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(anyhow!("condition not met within {:?}", timeout));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn shutdown(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
        for node in &self.nodes {
            node.stop();
        }
        tracing::info!("test cluster shut down");
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
