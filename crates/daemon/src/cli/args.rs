pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "beyond")]
#[command(about = "Encrypted, replicated file store: nodes, mounts and repair tools")]
pub struct Args {
    /// Mount API to talk to (defaults to the configured mount port on localhost)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the beyond config directory (defaults to ~/.beyond)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
