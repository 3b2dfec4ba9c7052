use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use common::coordinator::Coordinator;
use common::error::StoreError;
use common::gateway::MountGateway;
use common::identity::{Identity, IdentityProvider};
use common::jobs::JobDispatcher;
use common::ledger::NodeId;
use common::node::StorageNode;
use common::repair::{spawn_resync_worker, RepairService};

use crate::http_server::api::client::{
    cluster_replication, connect_membership, ApiClient, ApiError,
};
use crate::http_server::api::v0::node::{AnnounceRequest, PeersRequest};
use crate::service_config::{Config as ServiceConfig, Role};

/// How often a mount re-reads the cluster's peer lists
const MEMBERSHIP_REFRESH: Duration = Duration::from_secs(10);

/// Where a storage node can be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: NodeId,
    pub url: Url,
}

/// Storage nodes this node has heard of, itself included
#[derive(Debug, Clone, Default)]
pub struct PeerBook {
    peers: Arc<RwLock<BTreeMap<NodeId, Url>>>,
}

impl PeerBook {
    /// Record `id` at `url`; true when the node was not known before
    pub fn insert(&self, id: NodeId, url: Url) -> bool {
        self.peers.write().insert(id, url).is_none()
    }

    pub fn remove(&self, id: &NodeId) -> bool {
        self.peers.write().remove(id).is_some()
    }

    pub fn list(&self) -> Vec<PeerInfo> {
        self.peers
            .read()
            .iter()
            .map(|(id, url)| PeerInfo {
                id: *id,
                url: url.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NodeState {
    node: StorageNode,
    peers: PeerBook,
}

impl NodeState {
    pub fn new(node: StorageNode, advertise: Url) -> Self {
        let peers = PeerBook::default();
        peers.insert(node.id(), advertise);
        Self { node, peers }
    }

    pub fn node(&self) -> &StorageNode {
        &self.node
    }

    pub fn peers(&self) -> &PeerBook {
        &self.peers
    }

    /// Learn the cluster from `seeds` and announce ourselves to every member
    ///
    /// Unreachable seeds and members are logged and skipped; a node that
    /// cannot reach anybody starts a cluster of its own.
    pub async fn join(&self, seeds: &[Url], advertise: &Url) {
        for seed in seeds {
            let response = match ApiClient::new(seed) {
                Ok(api) => api.call(PeersRequest).await,
                Err(e) => Err(e),
            };
            match response {
                Ok(response) => {
                    for peer in response.peers {
                        self.peers.insert(peer.id, peer.url);
                    }
                }
                Err(e) => tracing::warn!(seed = %seed, error = %e, "could not reach seed"),
            }
        }

        let me = self.node.id();
        for peer in self.peers.list() {
            if peer.id == me {
                continue;
            }
            let announce = AnnounceRequest {
                id: me,
                url: advertise.clone(),
            };
            let result: Result<_, ApiError> = match ApiClient::new(&peer.url) {
                Ok(api) => api.call(announce).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(response) => {
                    for other in response.peers {
                        self.peers.insert(other.id, other.url);
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %peer.id.short(), error = %e, "announce failed")
                }
            }
        }
        tracing::info!(known = self.peers.len(), "joined cluster");
    }
}

#[derive(Debug, Clone)]
pub struct MountState {
    gateway: MountGateway,
}

impl MountState {
    pub fn new(gateway: MountGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &MountGateway {
        &self.gateway
    }
}

/// What a running daemon serves
#[derive(Debug, Clone)]
pub enum State {
    Node(NodeState),
    Mount(MountState),
}

impl State {
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StateSetupError> {
        match &config.role {
            Role::Node { storage, advertise } => {
                let node = StorageNode::open(storage, config.cluster.replication).await?;
                tracing::info!(
                    node = %node.id().short(),
                    storage = %storage.display(),
                    replication = node.replication(),
                    "storage node opened"
                );
                let state = NodeState::new(node, advertise.clone());
                state.join(&config.peers, advertise).await;
                Ok(State::Node(state))
            }
            Role::Mount {
                alias,
                passphrase,
                identities,
                create,
            } => {
                if config.peers.is_empty() {
                    return Err(StateSetupError::NoPeers);
                }
                let membership = connect_membership(&config.peers).await?;
                let mut cluster = config.cluster.clone();
                cluster.replication = cluster_replication(&membership).await?;
                cluster.validate()?;
                tracing::info!(
                    members = membership.len(),
                    replication = cluster.replication,
                    "connected to cluster"
                );
                // nodes joining or evicted later reach the mount through this
                membership.spawn_refresh(MEMBERSHIP_REFRESH);

                let provider = IdentityProvider::new(identities);
                let identity = mount_identity(&provider, alias, passphrase)?;

                let (jobs, receiver) = JobDispatcher::new();
                let repair = RepairService::new(Coordinator::new(
                    membership.clone(),
                    cluster.clone(),
                    None,
                ));
                // the worker stops once the coordinator's dispatcher drops
                spawn_resync_worker(repair, receiver);
                let coordinator = Coordinator::new(membership, cluster, Some(jobs));

                let gateway = if *create {
                    MountGateway::create_store(coordinator, identity, Some(provider)).await?
                } else {
                    MountGateway::open(coordinator, identity, Some(provider)).await?
                };
                Ok(State::Mount(MountState::new(gateway)))
            }
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            State::Node(_) => "node",
            State::Mount(_) => "mount",
        }
    }
}

/// The mount's identity, created on first use and reused afterwards
///
/// Any mount may be the first to run under an alias, with or without
/// `--create`; a wrong passphrase for an existing key is still refused.
fn mount_identity(
    provider: &IdentityProvider,
    alias: &str,
    passphrase: &str,
) -> Result<Identity, StoreError> {
    let identity = provider.create(alias, passphrase)?;
    tracing::info!(alias, key = %identity.public().short(), "mount identity ready");
    Ok(identity)
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("a mount needs at least one peer to reach the cluster")]
    NoPeers,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_peer_book() {
        let node = StorageNode::memory(3);
        let url = Url::parse("http://localhost:7400").unwrap();
        let state = NodeState::new(node.clone(), url.clone());
        assert_eq!(state.peers().len(), 1);
        assert!(!state.peers().insert(node.id(), url.clone()));

        let other = StorageNode::memory(3);
        assert!(state
            .peers()
            .insert(other.id(), Url::parse("http://localhost:7401").unwrap()));
        let listed = state.peers().list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|p| p.id == node.id() && p.url == url));
    }

    #[tokio::test]
    async fn test_join_without_seeds() {
        let node = StorageNode::memory(1);
        let url = Url::parse("http://localhost:7400").unwrap();
        let state = NodeState::new(node, url.clone());
        state
            .join(&[Url::parse("http://127.0.0.1:1").unwrap()], &url)
            .await;
        assert_eq!(state.peers().len(), 1);
    }

    #[test]
    fn test_mount_identity_without_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let provider = IdentityProvider::new(dir.path());
        let bob = mount_identity(&provider, "bob", "bob-pass").unwrap();
        assert!(provider.keysig_path("bob").exists());
        assert_eq!(provider.read_keysig("bob").unwrap().public(), bob.public());

        let again = mount_identity(&provider, "bob", "bob-pass").unwrap();
        assert_eq!(again.public(), bob.public());
        assert!(matches!(
            mount_identity(&provider, "bob", "wrong"),
            Err(StoreError::PermissionDenied(_))
        ));
    }
}
