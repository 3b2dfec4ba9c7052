use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::ledger::ObjectId;
use crate::object::ObjectRecord;

const RECORD_EXT: &str = "bin";

/// Where a storage node keeps its replicas
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug + 'static {
    async fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError>;

    async fn put(&self, record: &ObjectRecord) -> Result<(), StoreError>;

    /// Returns whether a record was present
    async fn delete(&self, id: &ObjectId) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<ObjectId>, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.list().await?.is_empty())
    }
}

/// Bincode files under `<root>/<shard>/<object id>.bin`
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        self.root
            .join(id.shard())
            .join(format!("{}.{}", id.to_hex(), RECORD_EXT))
    }
}

#[async_trait]
impl RecordStore for FsStore {
    async fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, record: &ObjectRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = bincode::serialize(record)?;
        // write-then-rename so a crash never leaves a torn record
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        let mut ids = Vec::new();
        let mut shards = tokio::fs::read_dir(&self.root).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match ObjectId::from_hex(stem) {
                    Ok(id) => ids.push(id),
                    Err(_) => tracing::warn!(?path, "skipping unrecognised file in object store"),
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store for tests and throwaway nodes
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<ObjectId, ObjectRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        Ok(self.inner.read().get(id).cloned())
    }

    async fn put(&self, record: &ObjectRecord) -> Result<(), StoreError> {
        self.inner.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.inner.write().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        let mut ids: Vec<_> = self.inner.read().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
