use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use url::Url;

use beyond_daemon::state::{AppState, StateError};
use beyond_daemon::{spawn_service, Role, ServiceConfig};

/// Run a mount gateway acting as one identity
#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Alias of the identity to mount as; its key is created on first use
    #[arg(long)]
    pub mount_key: String,

    /// Passphrase the identity's key is sealed with
    #[arg(long)]
    pub passphrase: String,

    /// Initialise a new store owned by this identity
    #[arg(long)]
    pub create: bool,

    /// Nodes to reach the cluster through (default from config)
    #[arg(long = "peer")]
    pub peers: Vec<Url>,

    /// Override the mount API port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = MountError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let port = self.port.unwrap_or(state.config.mount_port);

        let config = ServiceConfig {
            role: Role::Mount {
                alias: self.mount_key.clone(),
                passphrase: self.passphrase.clone(),
                identities: state.identities_path.clone(),
                create: self.create,
            },
            cluster: state.config.cluster.clone(),
            peers: crate::cli::op::resolve_peers(&self.peers, ctx.config_path.clone()),
            // the mount API carries the identity's authority, so it stays local
            listen_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            log_level: tracing::Level::INFO,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("mount stopped".to_string())
    }
}
