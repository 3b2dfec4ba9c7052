use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use common::error::StoreError;
use common::ledger::{NodeId, ObjectId, OwnershipRecord};
use common::node::{LockReply, NodeInfo};
use common::object::{Absorbed, ObjectRecord};
use common::transport::{Membership, NodeClient, PeerDiscovery};

use super::{ApiClient, ApiError, ApiRequest};
use crate::http_server::api::v0::node::{
    FetchRequest, InfoRequest, ListRequest, LockRequest, OwnershipRequest, PeersRequest,
    PingRequest, RemoveRequest, StoreRequest, UnlockRequest,
};
use crate::service_state::PeerInfo;

/// [`NodeClient`] over the node HTTP API
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    id: NodeId,
    api: ApiClient,
}

impl HttpNodeClient {
    pub fn new(id: NodeId, url: &Url) -> Result<Self, StoreError> {
        let api = ApiClient::new(url).map_err(ApiError::into_store_error)?;
        Ok(Self { id, api })
    }

    async fn call<T: ApiRequest + Send>(&self, request: T) -> Result<T::Response, StoreError> {
        self.api
            .call(request)
            .await
            .map_err(ApiError::into_store_error)
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    fn id(&self) -> NodeId {
        self.id
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.call(PingRequest).await.map(|_| ())
    }

    async fn info(&self) -> Result<NodeInfo, StoreError> {
        self.call(InfoRequest).await
    }

    async fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        Ok(self.call(FetchRequest { id: *id }).await?.record)
    }

    async fn lock(
        &self,
        id: &ObjectId,
        token: u64,
        base_version: u64,
    ) -> Result<LockReply, StoreError> {
        self.call(LockRequest {
            id: *id,
            token,
            base_version,
        })
        .await
    }

    async fn unlock(&self, id: &ObjectId, token: u64) -> Result<(), StoreError> {
        self.call(UnlockRequest { id: *id, token }).await.map(|_| ())
    }

    async fn store(
        &self,
        record: &ObjectRecord,
        token: Option<u64>,
    ) -> Result<Absorbed, StoreError> {
        self.call(StoreRequest {
            record: record.clone(),
            token,
        })
        .await
    }

    async fn set_ownership(
        &self,
        id: &ObjectId,
        ownership: &OwnershipRecord,
    ) -> Result<bool, StoreError> {
        let response = self
            .call(OwnershipRequest {
                id: *id,
                ownership: ownership.clone(),
            })
            .await?;
        Ok(response.applied)
    }

    async fn remove(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.call(RemoveRequest { id: *id }).await?.removed)
    }

    async fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        Ok(self.call(ListRequest).await?.ids)
    }
}

/// Collect the peer lists of the `seeds`
///
/// Every seed that answers contributes the nodes it knows about; seeds
/// that do not answer are skipped. Fails only when none answers.
pub async fn discover_peers(seeds: &[Url]) -> Result<Vec<PeerInfo>, StoreError> {
    let mut known: BTreeMap<NodeId, Url> = BTreeMap::new();
    let mut answered = 0;
    for seed in seeds {
        let api = ApiClient::new(seed).map_err(ApiError::into_store_error)?;
        match api.call(PeersRequest).await {
            Ok(response) => {
                answered += 1;
                for peer in response.peers {
                    known.entry(peer.id).or_insert(peer.url);
                }
            }
            Err(e) => tracing::warn!(seed = %seed, error = %e, "seed did not answer"),
        }
    }
    if answered == 0 {
        return Err(StoreError::unavailable("none of the given peers answered"));
    }
    Ok(known
        .into_iter()
        .map(|(id, url)| PeerInfo { id, url })
        .collect())
}

pub fn membership_from_peers(peers: &[PeerInfo]) -> Result<Membership, StoreError> {
    let membership = Membership::new();
    for peer in peers {
        tracing::debug!(node = %peer.id.short(), url = %peer.url, "member");
        membership.insert(Arc::new(HttpNodeClient::new(peer.id, &peer.url)?));
    }
    Ok(membership)
}

/// Re-reads the cluster's peer lists for a running mount
///
/// Asks the configured seeds plus every node learned in the previous
/// round, so the view survives the loss of its original seeds.
#[derive(Debug)]
pub struct HttpDiscovery {
    seeds: Vec<Url>,
    learned: RwLock<Vec<Url>>,
}

impl HttpDiscovery {
    pub fn new(seeds: Vec<Url>) -> Self {
        Self {
            seeds,
            learned: RwLock::new(Vec::new()),
        }
    }

    fn targets(&self) -> Vec<Url> {
        let mut targets = self.seeds.clone();
        for url in self.learned.read().iter() {
            if !targets.contains(url) {
                targets.push(url.clone());
            }
        }
        targets
    }
}

#[async_trait]
impl PeerDiscovery for HttpDiscovery {
    async fn discover(&self) -> Result<Vec<Arc<dyn NodeClient>>, StoreError> {
        let peers = discover_peers(&self.targets()).await?;
        *self.learned.write() = peers.iter().map(|p| p.url.clone()).collect();
        peers
            .iter()
            .map(|peer| {
                Ok(Arc::new(HttpNodeClient::new(peer.id, &peer.url)?) as Arc<dyn NodeClient>)
            })
            .collect()
    }
}

/// Membership view of the cluster the `seeds` belong to
///
/// The view can refresh itself from the same seeds later on.
pub async fn connect_membership(seeds: &[Url]) -> Result<Membership, StoreError> {
    let membership = membership_from_peers(&discover_peers(seeds).await?)?;
    Ok(membership.with_discovery(Arc::new(HttpDiscovery::new(seeds.to_vec()))))
}

/// Replication factor the cluster's nodes were created with
pub async fn cluster_replication(membership: &Membership) -> Result<u8, StoreError> {
    for client in membership.clients() {
        match client.info().await {
            Ok(info) => return Ok(info.replication),
            Err(e) => tracing::debug!(node = %client.id().short(), error = %e, "info failed"),
        }
    }
    Err(StoreError::unavailable("no member reported its replication factor"))
}
