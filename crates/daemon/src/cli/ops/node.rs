use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use url::Url;

use beyond_daemon::state::{AppState, StateError};
use beyond_daemon::{spawn_service, Role, ServiceConfig};

/// Run a storage node
#[derive(Args, Debug, Clone)]
pub struct Node {
    /// Directory holding this node's key and replicas (defaults to <config>/node)
    #[arg(long)]
    pub storage: Option<PathBuf>,

    /// Override the node API port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// URL other processes reach this node at (defaults to http://localhost:<port>)
    #[arg(long)]
    pub advertise: Option<Url>,

    /// Existing nodes to join through (default from config)
    #[arg(long = "peer")]
    pub peers: Vec<Url>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid advertise URL: {0}")]
    Url(#[from] url::ParseError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Node {
    type Error = NodeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let port = self.port.unwrap_or(state.config.node_port);
        let advertise = match &self.advertise {
            Some(url) => url.clone(),
            None => Url::parse(&format!("http://localhost:{}", port))?,
        };
        let storage = self
            .storage
            .clone()
            .unwrap_or_else(|| state.beyond_dir.join("node"));
        let peers = crate::cli::op::resolve_peers(&self.peers, ctx.config_path.clone())
            .into_iter()
            .filter(|peer| *peer != advertise)
            .collect();

        let config = ServiceConfig {
            role: Role::Node { storage, advertise },
            cluster: state.config.cluster.clone(),
            peers,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            log_level: tracing::Level::INFO,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("node stopped".to_string())
    }
}
