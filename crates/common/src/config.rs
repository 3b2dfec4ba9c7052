use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Largest replication factor the one-byte liveness mask can describe
pub const MAX_REPLICATION: u8 = 8;

/// Cluster-wide tunables
///
/// The replication factor is chosen when the first node is created and
/// every node persists it; the other values only shape client behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_replication")]
    pub replication: u8,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Largest length a write, append or truncate may leave a file at
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_replication() -> u8 {
    3
}

fn default_chunk_size() -> usize {
    4096
}

fn default_rpc_timeout_ms() -> u64 {
    2000
}

fn default_write_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_max_file_size() -> u64 {
    16 * 1024 * 1024
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            replication: default_replication(),
            chunk_size: default_chunk_size(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            write_retries: default_write_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl ClusterConfig {
    pub fn with_replication(replication: u8) -> Self {
        Self {
            replication,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.replication == 0 || self.replication > MAX_REPLICATION {
            return Err(StoreError::invalid(format!(
                "replication factor must be within 1..={}, got {}",
                MAX_REPLICATION, self.replication
            )));
        }
        if self.chunk_size == 0 {
            return Err(StoreError::invalid("chunk size must be non-zero"));
        }
        if self.max_file_size == 0 {
            return Err(StoreError::invalid("maximum file size must be non-zero"));
        }
        Ok(())
    }

    /// Refuse to grow a file to `len` bytes past the configured maximum
    pub fn check_file_size(&self, len: u64) -> Result<(), StoreError> {
        if len > self.max_file_size {
            return Err(StoreError::invalid(format!(
                "file length {} exceeds the maximum of {} bytes",
                len, self.max_file_size
            )));
        }
        Ok(())
    }

    /// Acks needed for a write to commit: a strict majority of R
    pub fn quorum(&self) -> usize {
        self.replication as usize / 2 + 1
    }

    /// Mask value meaning every slot is up to date
    pub fn full_mask(&self) -> u8 {
        crate::ledger::full_mask(self.replication as usize)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn from_toml(s: &str) -> Result<Self, StoreError> {
        let config: Self =
            toml::from_str(s).map_err(|e| StoreError::invalid(format!("bad config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
