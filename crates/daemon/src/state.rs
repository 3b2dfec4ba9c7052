use std::fs;
use std::path::PathBuf;

use common::config::ClusterConfig;
use common::identity::IdentityProvider;
use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "beyond";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const IDENTITIES_DIR_NAME: &str = "identities";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port the storage node API listens on
    #[serde(default = "default_node_port")]
    pub node_port: u16,
    /// Port the mount API listens on
    #[serde(default = "default_mount_port")]
    pub mount_port: u16,
    /// Nodes to contact when joining or mounting
    #[serde(default)]
    pub peers: Vec<Url>,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

fn default_node_port() -> u16 {
    7400
}

fn default_mount_port() -> u16 {
    7500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_port: default_node_port(),
            mount_port: default_mount_port(),
            peers: Vec::new(),
            cluster: ClusterConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the beyond directory (~/.beyond)
    pub beyond_dir: PathBuf,
    /// Directory holding sealed mount identities and group keys
    pub identities_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the beyond directory path (custom or default ~/.beyond)
    pub fn beyond_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new beyond state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let beyond_dir = Self::beyond_dir(custom_path)?;
        if beyond_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }
        let config = config.unwrap_or_default();
        config
            .cluster
            .validate()
            .map_err(|e| StateError::InvalidConfig(e.to_string()))?;

        fs::create_dir_all(&beyond_dir)?;
        let identities_path = beyond_dir.join(IDENTITIES_DIR_NAME);
        fs::create_dir_all(&identities_path)?;

        let config_path = beyond_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self {
            beyond_dir,
            identities_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the beyond directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let beyond_dir = Self::beyond_dir(custom_path)?;
        let config_path = beyond_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config
            .cluster
            .validate()
            .map_err(|e| StateError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            identities_path: beyond_dir.join(IDENTITIES_DIR_NAME),
            beyond_dir,
            config_path,
            config,
        })
    }

    /// Identity provider over this state's identities directory
    pub fn identities(&self) -> IdentityProvider {
        IdentityProvider::new(&self.identities_path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("beyond directory not initialized. Run 'beyond init' first")]
    NotInitialized,

    #[error("beyond directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = Some(dir.path().join("state"));
        let state = AppState::init(path.clone(), None).unwrap();
        assert!(state.identities_path.exists());

        let loaded = AppState::load(path.clone()).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
        assert!(matches!(
            AppState::init(path, None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("nope"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_rejects_bad_replication() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.cluster.replication = 0;
        assert!(matches!(
            AppState::init(Some(dir.path().to_path_buf()), Some(config)),
            Err(StateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "node_port = 9000\n[cluster]\nreplication = 5\n",
        )
        .unwrap();
        let state = AppState::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(state.config.node_port, 9000);
        assert_eq!(state.config.mount_port, 7500);
        assert_eq!(state.config.cluster.replication, 5);
        assert_eq!(state.config.cluster.chunk_size, 4096);
    }
}
