use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::ledger::NodeId;
use crate::node::StorageNode;
use crate::transport::{LocalClient, NodeClient};

/// One storage node of a [`super::TestCluster`]
///
/// Nodes with a directory keep their objects and identity across
/// [`TestNode::restart`]; memory nodes only toggle reachability.
#[derive(Debug)]
pub struct TestNode {
    pub name: String,
    dir: Option<PathBuf>,
    replication: u8,
    client: LocalClient,
}

impl TestNode {
    pub async fn new(name: impl Into<String>, dir: Option<PathBuf>, replication: u8) -> Result<Self> {
        let node = match &dir {
            Some(dir) => StorageNode::open(dir, replication).await?,
            None => StorageNode::memory(replication),
        };
        Ok(Self {
            name: name.into(),
            dir,
            replication,
            client: LocalClient::new(node),
        })
    }

    pub fn id(&self) -> NodeId {
        self.client.id()
    }

    pub fn client(&self) -> &LocalClient {
        &self.client
    }

    pub fn node(&self) -> &StorageNode {
        self.client.node()
    }

    pub fn handle(&self) -> Arc<dyn NodeClient> {
        Arc::new(self.client.clone())
    }

    pub fn is_running(&self) -> bool {
        self.client.is_reachable()
    }

    pub fn stop(&self) {
        tracing::debug!(node = %self.name, "stopping node");
        self.client.set_reachable(false);
    }

    /// Bring the node back, reloading it from disk when it has a directory
    pub async fn restart(&mut self) -> Result<()> {
        if let Some(dir) = &self.dir {
            let node = StorageNode::open(dir, self.replication).await?;
            self.client = LocalClient::new(node);
        }
        self.client.set_reachable(true);
        tracing::debug!(node = %self.name, id = %self.id().short(), "restarted node");
        Ok(())
    }

    /// Drop all local data and come back as a new identity
    pub async fn wipe(&mut self) -> Result<()> {
        self.stop();
        let node = match &self.dir {
            Some(dir) => {
                if dir.exists() {
                    tokio::fs::remove_dir_all(dir).await?;
                }
                StorageNode::open(dir, self.replication).await?
            }
            None => StorageNode::memory(self.replication),
        };
        self.client = LocalClient::new(node);
        tracing::debug!(node = %self.name, id = %self.id().short(), "wiped node");
        Ok(())
    }
}
