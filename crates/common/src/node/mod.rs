//! Storage node
//!
//! A node holds replicas for whichever objects name it as an owner. It knows
//! nothing about quorum or placement; coordinators drive it through the
//! replica operations below. Mutations of one object are serialized by a
//! per-object async mutex while different objects proceed in parallel.
//!
//! File writes are fenced by short leases: a coordinator first takes a lease
//! at the version it read, then stores with the lease token. A node refuses
//! a lease if it already holds a newer version, which is how concurrent
//! writers from different mounts end up totally ordered.

mod store;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use store::{FsStore, MemoryStore, RecordStore};

use crate::crypto::SecretKey;
use crate::error::StoreError;
use crate::ledger::{NodeId, ObjectId, OwnershipRecord};
use crate::object::{Absorbed, ObjectKind, ObjectRecord};

pub const NODE_KEY_FILE: &str = "node.pem";
pub const NODE_CONFIG_FILE: &str = "node.toml";
pub const OBJECTS_DIR: &str = "objects";

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub replication: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockReply {
    Granted,
    /// Another writer holds an unexpired lease
    Busy,
    /// This replica already holds a newer version than the caller read
    Outdated { version: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeConfigFile {
    replication: u8,
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    token: u64,
    expires: Instant,
}

impl Lease {
    fn is_active(&self) -> bool {
        self.expires > Instant::now()
    }
}

#[derive(Debug, Clone)]
pub struct StorageNode {
    inner: Arc<NodeInner>,
}

#[derive(Debug)]
struct NodeInner {
    secret: SecretKey,
    replication: u8,
    store: Arc<dyn RecordStore>,
    guards: Mutex<HashMap<ObjectId, Arc<tokio::sync::Mutex<()>>>>,
    leases: Mutex<HashMap<ObjectId, Lease>>,
    lease_ttl: Duration,
}

impl StorageNode {
    /// Open (or initialise) a node rooted at `dir`
    ///
    /// The node key is generated whenever the directory holds none, so a
    /// wiped node comes back as a new identity. The replication factor is
    /// fixed by the first open; reopening with another value is rejected.
    pub async fn open(dir: &Path, replication: u8) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(dir).await?;

        let config_path = dir.join(NODE_CONFIG_FILE);
        if config_path.exists() {
            let contents = tokio::fs::read_to_string(&config_path).await?;
            let config: NodeConfigFile = toml::from_str(&contents)
                .map_err(|e| StoreError::Internal(format!("bad {}: {}", NODE_CONFIG_FILE, e)))?;
            if config.replication != replication {
                return Err(StoreError::invalid(format!(
                    "node was created with replication {}, not {}",
                    config.replication, replication
                )));
            }
        } else {
            let contents = toml::to_string(&NodeConfigFile { replication })
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            tokio::fs::write(&config_path, contents).await?;
        }

        let key_path = dir.join(NODE_KEY_FILE);
        let secret = if key_path.exists() {
            SecretKey::from_pem(&tokio::fs::read_to_string(&key_path).await?)?
        } else {
            let secret = SecretKey::generate();
            tokio::fs::write(&key_path, secret.to_pem()).await?;
            tracing::info!(node = %secret.public().short(), "generated new node identity");
            secret
        };

        let store = FsStore::open(dir.join(OBJECTS_DIR)).await?;
        Ok(Self::with_store(secret, replication, Arc::new(store)))
    }

    /// Node backed by memory only
    pub fn memory(replication: u8) -> Self {
        Self::with_store(
            SecretKey::generate(),
            replication,
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn with_store(secret: SecretKey, replication: u8, store: Arc<dyn RecordStore>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                secret,
                replication,
                store,
                guards: Mutex::new(HashMap::new()),
                leases: Mutex::new(HashMap::new()),
                lease_ttl: DEFAULT_LEASE_TTL,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.secret.public()
    }

    pub fn replication(&self) -> u8 {
        self.inner.replication
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id(),
            replication: self.inner.replication,
        }
    }

    fn guard(&self, id: &ObjectId) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .guards
            .lock()
            .entry(*id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn active_lease(&self, id: &ObjectId) -> Option<Lease> {
        let mut leases = self.inner.leases.lock();
        match leases.get(id) {
            Some(lease) if lease.is_active() => Some(*lease),
            Some(_) => {
                leases.remove(id);
                None
            }
            None => None,
        }
    }

    pub async fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        self.inner.store.get(id).await
    }

    /// Take a write lease on `id` for a writer that read `base_version`
    pub async fn lock(
        &self,
        id: &ObjectId,
        token: u64,
        base_version: u64,
    ) -> Result<LockReply, StoreError> {
        let guard = self.guard(id);
        let _held = guard.lock().await;

        if let Some(local) = self.inner.store.get(id).await? {
            if local.version > base_version {
                return Ok(LockReply::Outdated {
                    version: local.version,
                });
            }
        }
        if let Some(lease) = self.active_lease(id) {
            if lease.token != token {
                return Ok(LockReply::Busy);
            }
        }
        self.inner.leases.lock().insert(
            *id,
            Lease {
                token,
                expires: Instant::now() + self.inner.lease_ttl,
            },
        );
        Ok(LockReply::Granted)
    }

    pub async fn unlock(&self, id: &ObjectId, token: u64) {
        let mut leases = self.inner.leases.lock();
        if leases.get(id).map(|l| l.token) == Some(token) {
            leases.remove(id);
        }
    }

    /// Apply an incoming replica
    ///
    /// Files under someone else's active lease are refused with `Conflict`.
    /// A store carrying the lease token releases the lease.
    pub async fn store(
        &self,
        record: ObjectRecord,
        token: Option<u64>,
    ) -> Result<Absorbed, StoreError> {
        let id = record.id;
        let guard = self.guard(&id);
        let _held = guard.lock().await;

        if record.kind() == ObjectKind::File {
            if let Some(lease) = self.active_lease(&id) {
                if Some(lease.token) != token {
                    return Err(StoreError::Conflict(format!("object {} is locked", id)));
                }
            }
        }

        let outcome = match self.inner.store.get(&id).await? {
            Some(mut local) => {
                let before_epoch = local.ownership.epoch();
                let outcome = local.absorb(record)?;
                let ownership_moved = local.ownership.epoch() != before_epoch;
                if !matches!(outcome, Absorbed::Outdated { .. }) || ownership_moved {
                    self.inner.store.put(&local).await?;
                }
                outcome
            }
            None => {
                self.inner.store.put(&record).await?;
                Absorbed::Stored
            }
        };

        if let Some(token) = token {
            self.unlock(&id, token).await;
        }
        tracing::debug!(node = %self.id().short(), object = ?id, ?outcome, "store");
        Ok(outcome)
    }

    /// Replace ownership if `ownership` carries a newer epoch
    pub async fn set_ownership(
        &self,
        id: &ObjectId,
        ownership: OwnershipRecord,
    ) -> Result<bool, StoreError> {
        let guard = self.guard(id);
        let _held = guard.lock().await;

        let Some(mut local) = self.inner.store.get(id).await? else {
            return Err(StoreError::not_found(format!("object {}", id)));
        };
        if !ownership.is_newer_than(&local.ownership) {
            return Ok(false);
        }
        local.ownership = ownership;
        self.inner.store.put(&local).await?;
        Ok(true)
    }

    pub async fn remove(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let guard = self.guard(id);
        let _held = guard.lock().await;
        self.inner.leases.lock().remove(id);
        let removed = self.inner.store.delete(id).await?;
        drop(_held);
        self.inner.guards.lock().remove(id);
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        self.inner.store.list().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::CapabilityRecord;

    fn file(owner: &SecretKey) -> ObjectRecord {
        ObjectRecord::new_file(
            ObjectId::generate(),
            CapabilityRecord::new(owner.public()),
            8,
        )
    }

    #[tokio::test]
    async fn test_identity_persists_until_wiped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node0");
        let first = StorageNode::open(&path, 3).await.unwrap().id();
        let again = StorageNode::open(&path, 3).await.unwrap().id();
        assert_eq!(first, again);

        std::fs::remove_dir_all(&path).unwrap();
        let wiped = StorageNode::open(&path, 3).await.unwrap().id();
        assert_ne!(first, wiped);
    }

    #[tokio::test]
    async fn test_replication_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        StorageNode::open(dir.path(), 3).await.unwrap();
        assert!(matches!(
            StorageNode::open(dir.path(), 2).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_lease_orders_writers() {
        let node = StorageNode::memory(3);
        let owner = SecretKey::generate();
        let record = file(&owner);
        node.store(record.clone(), None).await.unwrap();

        assert_eq!(node.lock(&record.id, 1, 1).await.unwrap(), LockReply::Granted);
        assert_eq!(node.lock(&record.id, 2, 1).await.unwrap(), LockReply::Busy);

        let mut next = record.clone();
        next.file_mut().unwrap().append(b"one").unwrap();
        next.advance();

        // writer without the lease is refused
        assert!(matches!(
            node.store(next.clone(), Some(2)).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(node.store(next, Some(1)).await.unwrap(), Absorbed::Stored);

        // the second writer read version 1 and must re-read
        assert_eq!(
            node.lock(&record.id, 2, 1).await.unwrap(),
            LockReply::Outdated { version: 2 }
        );
        assert_eq!(node.lock(&record.id, 2, 2).await.unwrap(), LockReply::Granted);
        node.unlock(&record.id, 2).await;
        assert_eq!(node.lock(&record.id, 3, 2).await.unwrap(), LockReply::Granted);
    }

    #[tokio::test]
    async fn test_ownership_epochs() {
        let node = StorageNode::memory(3);
        let owner = SecretKey::generate();
        let record = file(&owner);
        node.store(record.clone(), None).await.unwrap();

        let mut ownership = OwnershipRecord::new(vec![node.id()]);
        assert!(!node
            .set_ownership(&record.id, ownership.clone())
            .await
            .unwrap());
        ownership.bump();
        assert!(node.set_ownership(&record.id, ownership.clone()).await.unwrap());
        let stored = node.fetch(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.ownership, ownership);

        assert!(matches!(
            node.set_ownership(&ObjectId::generate(), ownership).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove() {
        let node = StorageNode::memory(3);
        let record = file(&SecretKey::generate());
        node.store(record.clone(), None).await.unwrap();
        assert_eq!(node.list().await.unwrap(), vec![record.id]);
        assert!(node.remove(&record.id).await.unwrap());
        assert!(node.fetch(&record.id).await.unwrap().is_none());
    }
}
