use std::net::SocketAddr;
use std::path::PathBuf;

use common::config::ClusterConfig;
use url::Url;

/// What a daemon process serves
#[derive(Debug, Clone)]
pub enum Role {
    /// A storage node holding replicas under `storage`
    Node {
        storage: PathBuf,
        /// URL other processes use to reach this node
        advertise: Url,
    },
    /// A mount gateway acting as `alias`
    Mount {
        alias: String,
        passphrase: String,
        identities: PathBuf,
        /// Initialise a fresh store instead of attaching to one
        create: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,

    // cluster configuration
    pub cluster: ClusterConfig,
    /// Known nodes to join through or mount over
    pub peers: Vec<Url>,

    // http server configuration
    pub listen_addr: SocketAddr,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
