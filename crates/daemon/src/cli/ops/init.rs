use clap::Args;
use url::Url;

use beyond_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port storage nodes listen on
    #[arg(long)]
    pub node_port: Option<u16>,

    /// Port the mount API listens on
    #[arg(long)]
    pub mount_port: Option<u16>,

    /// Node URLs to join through and mount over (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<Url>,

    /// Copies kept of every object; fixed for the life of the cluster
    #[arg(long)]
    pub replication: Option<u8>,

    /// Bytes per file chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(port) = self.node_port {
            config.node_port = port;
        }
        if let Some(port) = self.mount_port {
            config.mount_port = port;
        }
        config.peers = self.peers.clone();
        if let Some(replication) = self.replication {
            config.cluster.replication = replication;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.cluster.chunk_size = chunk_size;
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        Ok(format!(
            "Initialized beyond directory at {}\n  identities: {}\n  replication: {}\n  node_port:  {}\n  mount_port: {}",
            state.beyond_dir.display(),
            state.identities_path.display(),
            state.config.cluster.replication,
            state.config.node_port,
            state.config.mount_port,
        ))
    }
}
