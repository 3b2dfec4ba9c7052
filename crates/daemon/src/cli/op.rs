use std::error::Error;
use std::path::PathBuf;

use url::Url;

use beyond_daemon::http_server::api::client::{ApiClient, ApiError};
use beyond_daemon::state::AppState;

const DEFAULT_REMOTE: &str = "http://localhost:7500";

/// Resolve the mount API URL for the client.
///
/// Priority: explicit `--remote` flag > config file `mount_port` > 7500.
pub fn resolve_remote(explicit: Option<Url>, config_path: Option<PathBuf>) -> Url {
    if let Some(url) = explicit {
        return url;
    }
    if let Ok(state) = AppState::load(config_path) {
        if let Ok(url) = Url::parse(&format!("http://localhost:{}", state.config.mount_port)) {
            return url;
        }
    }
    Url::parse(DEFAULT_REMOTE).expect("hardcoded URL must parse")
}

/// Node URLs from the flag, or the configured peers when none were given
pub fn resolve_peers(explicit: &[Url], config_path: Option<PathBuf>) -> Vec<Url> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    AppState::load(config_path)
        .map(|state| state.config.peers)
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct OpContext {
    /// API client for the mount daemon
    pub client: ApiClient,
    /// Optional custom config path (defaults to ~/.beyond)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(remote: Url, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(&remote)?,
            config_path,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_remote_explicit_wins() {
        let explicit = Url::parse("http://example.com:9999").unwrap();
        let result = resolve_remote(Some(explicit.clone()), None);
        assert_eq!(result, explicit);
    }

    #[test]
    fn test_resolve_remote_falls_back_to_default() {
        let result = resolve_remote(None, Some(PathBuf::from("/nonexistent")));
        assert_eq!(result.as_str(), "http://localhost:7500/");
    }

    #[test]
    fn test_resolve_remote_uses_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = beyond_daemon::AppConfig {
            mount_port: 7777,
            ..Default::default()
        };
        AppState::init(Some(dir.path().to_path_buf()), Some(config)).unwrap();
        let result = resolve_remote(None, Some(dir.path().to_path_buf()));
        assert_eq!(result.port(), Some(7777));
    }

    #[test]
    fn test_resolve_peers() {
        let explicit = vec![Url::parse("http://n1:7400").unwrap()];
        assert_eq!(resolve_peers(&explicit, None), explicit);
        assert!(resolve_peers(&[], Some(PathBuf::from("/nonexistent"))).is_empty());
    }
}
