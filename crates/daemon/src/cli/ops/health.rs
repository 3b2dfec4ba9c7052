use clap::Args;

use beyond_daemon::state::AppState;

/// Check the local config and the mount daemon's status endpoints
#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                let identities = if state.identities_path.is_dir() {
                    "OK"
                } else {
                    "MISSING"
                };
                lines.push(format!("  directory:    {}", state.beyond_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                lines.push(format!("  identities/:  {}", identities));
                lines.push(format!("  replication:  {}", state.config.cluster.replication));
                lines.push(format!("  node_port:    {}", state.config.node_port));
                lines.push(format!("  mount_port:   {}", state.config.mount_port));
                lines.push(format!("  peers:        {}", state.config.peers.len()));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Daemon ({}):", base));

        for probe in ["livez", "readyz"] {
            let url = format!("{}/_status/{}", base.as_str().trim_end_matches('/'), probe);
            let status = match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => "OK".to_string(),
                Ok(resp) => format!("UNHEALTHY ({})", resp.status()),
                Err(_) => "NOT REACHABLE".to_string(),
            };
            lines.push(format!("  {:<7} {}", format!("{}:", probe), status));
        }

        Ok(lines.join("\n"))
    }
}
