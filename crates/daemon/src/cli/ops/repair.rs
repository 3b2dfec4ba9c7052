use clap::{Args, Subcommand};
use url::Url;

use beyond_daemon::http_server::api::client::{
    cluster_replication, discover_peers, membership_from_peers, ApiClient,
};
use beyond_daemon::http_server::api::v0::node::ForgetRequest;
use beyond_daemon::service_state::PeerInfo;
use beyond_daemon::state::AppState;
use common::config::ClusterConfig;
use common::coordinator::Coordinator;
use common::crypto::PublicKey;
use common::error::StoreError;
use common::ledger::ObjectId;
use common::repair::RepairService;

use crate::cli::op::{resolve_peers, Op, OpContext};

/// Out-of-band membership repair against a live cluster
#[derive(Args, Debug, Clone)]
pub struct Repair {
    /// Nodes to reach the cluster through (default from config)
    #[arg(long = "peer", global = true)]
    pub peers: Vec<Url>,

    #[command(subcommand)]
    pub command: RepairCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RepairCommand {
    /// Remove a lost node from every ownership record
    Evict {
        /// Hex public key of the node to drop
        node: String,
    },
    /// Bring every object back to full replication
    Heal,
    /// Re-replicate a single object
    Resync {
        /// Hex object address, as printed by `ctl get address`
        object: String,
    },
    /// List the nodes the cluster knows about and whether they answer
    Members,
}

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no peers given and none configured")]
    NoPeers,
    #[error("invalid node id: {0}")]
    NodeId(String),
}

#[async_trait::async_trait]
impl Op for Repair {
    type Error = RepairError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let peers = resolve_peers(&self.peers, ctx.config_path.clone());
        if peers.is_empty() {
            return Err(RepairError::NoPeers);
        }
        let known = discover_peers(&peers).await?;
        let membership = membership_from_peers(&known)?;
        let mut cluster = AppState::load(ctx.config_path.clone())
            .map(|state| state.config.cluster)
            .unwrap_or_else(|_| ClusterConfig::default());
        cluster.replication = cluster_replication(&membership).await?;
        let service = RepairService::new(Coordinator::new(membership.clone(), cluster, None));

        match &self.command {
            RepairCommand::Evict { node } => {
                let node = PublicKey::from_hex(node.trim())
                    .map_err(|e| RepairError::NodeId(e.to_string()))?;
                let report = service.evict(&node).await?;
                let forgotten = forget_everywhere(&known, node).await;
                Ok(format!(
                    "evicted {}: scanned {}, updated {}, skipped {}, forgotten by {} peers",
                    node.short(),
                    report.scanned,
                    report.updated,
                    report.skipped,
                    forgotten
                ))
            }
            RepairCommand::Heal => {
                let report = service.heal().await?;
                Ok(format!(
                    "healed: scanned {}, resynced {}, owners added {}",
                    report.scanned, report.resynced, report.added
                ))
            }
            RepairCommand::Resync { object } => {
                let id = ObjectId::from_hex(object.trim())?;
                let report = service.resync(&id).await?;
                Ok(format!(
                    "resynced {}: copies {}, owners added {}",
                    object, report.resynced, report.added
                ))
            }
            RepairCommand::Members => {
                let reachable: Vec<_> = membership
                    .reachable()
                    .await
                    .iter()
                    .map(|client| client.id())
                    .collect();
                Ok(membership
                    .ids()
                    .iter()
                    .map(|id| {
                        let status = if reachable.contains(id) { "up" } else { "down" };
                        format!("{}  {}", id.to_hex(), status)
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
    }
}

/// Ask every other node to drop `node` from its peer book
async fn forget_everywhere(known: &[PeerInfo], node: PublicKey) -> usize {
    let mut forgotten = 0;
    for peer in known.iter().filter(|peer| peer.id != node) {
        let result = match ApiClient::new(&peer.url) {
            Ok(api) => api.call(ForgetRequest { id: node }).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(response) if response.forgotten => forgotten += 1,
            Ok(_) => {}
            Err(e) => tracing::warn!(peer = %peer.id.short(), error = %e, "forget failed"),
        }
    }
    forgotten
}
