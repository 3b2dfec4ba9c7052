use clap::{Args, Subcommand};

use beyond_daemon::http_server::api::client::ApiError;
use beyond_daemon::http_server::api::v0::ctl::{GetRequest, SetRequest};

use crate::cli::op::{Op, OpContext};

/// Inspect and change capabilities, aliases and ownership
#[derive(Args, Debug, Clone)]
pub struct Ctl {
    #[command(subcommand)]
    pub command: CtlCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CtlCommand {
    Get(GetRequest),
    Set(SetRequest),
}

#[async_trait::async_trait]
impl Op for Ctl {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        match &self.command {
            CtlCommand::Get(req) => Ok(ctx.client.call(req.clone()).await?.value),
            CtlCommand::Set(req) => {
                let response = ctx.client.call(req.clone()).await?;
                Ok(format!("{} applied to {}", response.verb, response.path))
            }
        }
    }
}
