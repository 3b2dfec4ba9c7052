use clap::{Args, Subcommand};

use beyond_daemon::state::{AppState, StateError};
use common::error::StoreError;

#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeyCommand {
    /// Create a mount identity and print its key signature
    Create {
        alias: String,
        #[arg(long)]
        passphrase: String,
    },
    /// Print the key signature of an existing identity
    Show { alias: String },
    /// Check that a passphrase opens an identity
    Check {
        alias: String,
        #[arg(long)]
        passphrase: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Key {
    type Error = KeyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let provider = AppState::load(ctx.config_path.clone())?.identities();
        match &self.command {
            KeyCommand::Create { alias, passphrase } => {
                let identity = provider.create(alias, passphrase)?;
                Ok(identity.key_signature().to_string())
            }
            KeyCommand::Show { alias } => Ok(provider.read_keysig(alias)?.to_string()),
            KeyCommand::Check { alias, passphrase } => {
                let identity = provider.load(alias, passphrase)?;
                Ok(format!("{} opens ({})", alias, identity.public().short()))
            }
        }
    }
}
