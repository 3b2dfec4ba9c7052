//! Mount gateway
//!
//! Translates path based file operations from one mount point into
//! capability checks and coordinator calls. Every mount reads through the
//! coordinator, so two mounts over the same store see each other's changes
//! as soon as they land on the owners.
//!
//! Walking a path needs no permission; listing, reading and stat need read,
//! and anything that changes an object or a directory needs write.

mod admin;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use admin::{GetVerb, SetVerb};

use crate::capability::{Action, AliasBook, Subject};
use crate::coordinator::Coordinator;
use crate::error::StoreError;
use crate::identity::{Identity, IdentityProvider};
use crate::ledger::ObjectId;
use crate::object::{ObjectKind, ObjectRecord, TruncateOutcome};

/// A directory entry as shown to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub kind: ObjectKind,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub size: u64,
    pub version: u64,
    pub modified: i64,
    pub owners: usize,
    pub mask: u8,
}

#[derive(Debug, Clone)]
pub struct MountGateway {
    inner: Arc<GatewayInner>,
}

#[derive(Debug)]
struct GatewayInner {
    coordinator: Coordinator,
    identity: RwLock<Identity>,
    provider: Option<IdentityProvider>,
    aliases: RwLock<AliasBook>,
    /// Distinguishes this mount's directory operations from other mounts'
    origin: Uuid,
}

impl MountGateway {
    /// Initialise a fresh store whose root belongs to `identity`
    pub async fn create_store(
        coordinator: Coordinator,
        identity: Identity,
        provider: Option<IdentityProvider>,
    ) -> Result<Self, StoreError> {
        match coordinator.fetch(&ObjectId::ROOT).await {
            Ok(_) => {
                return Err(StoreError::Conflict(
                    "store is already initialised".to_string(),
                ))
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let root = ObjectRecord::new_directory(
            ObjectId::ROOT,
            crate::capability::CapabilityRecord::new(identity.public()),
        );
        coordinator.insert(root).await?;
        tracing::info!(alias = identity.alias(), "initialised store");
        Self::attach(coordinator, identity, provider)
    }

    /// Attach to an existing store
    pub async fn open(
        coordinator: Coordinator,
        identity: Identity,
        provider: Option<IdentityProvider>,
    ) -> Result<Self, StoreError> {
        coordinator.fetch(&ObjectId::ROOT).await?;
        Self::attach(coordinator, identity, provider)
    }

    fn attach(
        coordinator: Coordinator,
        identity: Identity,
        provider: Option<IdentityProvider>,
    ) -> Result<Self, StoreError> {
        let aliases = match &provider {
            Some(provider) => provider.load_alias_book(identity.alias())?,
            None => AliasBook::default(),
        };
        tracing::info!(alias = identity.alias(), key = %identity.public().short(), "mounted store");
        Ok(Self {
            inner: Arc::new(GatewayInner {
                coordinator,
                identity: RwLock::new(identity),
                provider,
                aliases: RwLock::new(aliases),
                origin: Uuid::new_v4(),
            }),
        })
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub fn alias(&self) -> String {
        self.inner.identity.read().alias().to_string()
    }

    pub fn public(&self) -> Subject {
        self.inner.identity.read().public()
    }

    fn subjects(&self) -> Vec<Subject> {
        self.inner.identity.read().subjects()
    }

    /// Resolve `path` to its current record
    pub async fn resolve(&self, path: &str) -> Result<ObjectRecord, StoreError> {
        let coordinator = &self.inner.coordinator;
        let mut record = coordinator.fetch(&ObjectId::ROOT).await?;
        for component in split_path(path)? {
            let listing = record
                .directory()?
                .lookup(component)
                .ok_or_else(|| StoreError::not_found(path.to_string()))?;
            record = coordinator.fetch(&listing.child).await?;
        }
        Ok(record)
    }

    async fn resolve_parent<'a>(
        &self,
        path: &'a str,
    ) -> Result<(ObjectRecord, &'a str), StoreError> {
        let mut components = split_path(path)?;
        let name = components
            .pop()
            .ok_or_else(|| StoreError::invalid("the mount root has no parent"))?;
        let parent = self.resolve(&components.join("/")).await?;
        parent.directory()?;
        Ok((parent, name))
    }

    pub async fn create(&self, path: &str) -> Result<ObjectId, StoreError> {
        self.make(path, ObjectKind::File).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<ObjectId, StoreError> {
        self.make(path, ObjectKind::Directory).await
    }

    async fn make(&self, path: &str, kind: ObjectKind) -> Result<ObjectId, StoreError> {
        let coordinator = &self.inner.coordinator;
        let subjects = self.subjects();
        let (parent, name) = self.resolve_parent(path).await?;
        parent.capability.authorize(&subjects, Action::Write)?;
        if parent.directory()?.contains(name) {
            return Err(StoreError::Conflict(format!("{} already exists", path)));
        }

        // one-shot snapshot of the parent's inheritable relations
        let capability = parent.capability.inherit_for_child(self.public());
        let id = ObjectId::generate();
        let record = match kind {
            ObjectKind::File => {
                ObjectRecord::new_file(id, capability, coordinator.config().chunk_size)
            }
            ObjectKind::Directory => ObjectRecord::new_directory(id, capability),
        };
        coordinator.insert(record).await?;

        let origin = self.inner.origin;
        let linked = coordinator
            .update_entries(&parent.id, |dir| {
                dir.capability.authorize(&subjects, Action::Write)?;
                let entries = dir.directory_mut()?;
                if entries.contains(name) {
                    return Err(StoreError::Conflict(format!("{} already exists", path)));
                }
                let op = entries.next_op(origin);
                entries.insert(name, op, id, kind);
                Ok(())
            })
            .await;
        if let Err(e) = linked {
            if let Err(cleanup) = coordinator.delete(&id).await {
                tracing::warn!(object = ?id, error = %cleanup, "orphan not removed");
            }
            return Err(e);
        }

        tracing::info!(path, %kind, object = ?id, "created");
        Ok(id)
    }

    /// Write `data` at `offset`; returns the number of bytes written
    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize, StoreError> {
        let config = self.inner.coordinator.config();
        config.check_file_size(offset.saturating_add(data.len() as u64))?;
        self.modify_file(path, |content| {
            content.write(offset, data)?;
            Ok(data.len())
        })
        .await
    }

    /// Append `data`; returns the new file length
    pub async fn append(&self, path: &str, data: &[u8]) -> Result<u64, StoreError> {
        let config = self.inner.coordinator.config().clone();
        self.modify_file(path, |content| {
            config.check_file_size(content.len().saturating_add(data.len() as u64))?;
            content.append(data)?;
            Ok(content.len())
        })
        .await
    }

    pub async fn truncate(&self, path: &str, len: u64) -> Result<TruncateOutcome, StoreError> {
        self.inner.coordinator.config().check_file_size(len)?;
        self.modify_file(path, |content| Ok(content.truncate(len)))
            .await
    }

    async fn modify_file<T, F>(&self, path: &str, mut change: F) -> Result<T, StoreError>
    where
        F: FnMut(&mut crate::object::FileContent) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let subjects = self.subjects();
        let record = self.resolve(path).await?;
        record.file()?;
        record.capability.authorize(&subjects, Action::Write)?;
        self.inner
            .coordinator
            .update(&record.id, |current| {
                // grants may have changed since the path was resolved
                current.capability.authorize(&subjects, Action::Write)?;
                change(current.file_mut()?)
            })
            .await
    }

    pub async fn read(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        let record = self.readable(path).await?;
        Ok(record.file()?.read(offset, len))
    }

    pub async fn read_all(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let record = self.readable(path).await?;
        Ok(record.file()?.read_all())
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<Entry>, StoreError> {
        let record = self.readable(path).await?;
        Ok(record
            .directory()?
            .list()
            .into_iter()
            .map(|listing| Entry {
                name: listing.name,
                kind: listing.kind,
                id: listing.child,
            })
            .collect())
    }

    pub async fn stat(&self, path: &str) -> Result<Stat, StoreError> {
        let record = self.readable(path).await?;
        Ok(Stat {
            id: record.id,
            kind: record.kind(),
            size: record.size(),
            version: record.version,
            modified: record.modified,
            owners: record.ownership.owners().len(),
            mask: record.ownership.mask(),
        })
    }

    async fn readable(&self, path: &str) -> Result<ObjectRecord, StoreError> {
        let record = self.resolve(path).await?;
        record.capability.authorize(&self.subjects(), Action::Read)?;
        Ok(record)
    }

    /// Unlink `path` and drop the objects it referenced
    ///
    /// Directories are dereferenced recursively; each descendant is removed
    /// from its owners after the entry itself is gone.
    pub async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let coordinator = &self.inner.coordinator;
        let subjects = self.subjects();
        let (parent, name) = self.resolve_parent(path).await?;
        parent.capability.authorize(&subjects, Action::Write)?;

        let removed = coordinator
            .update_entries(&parent.id, |dir| {
                dir.capability.authorize(&subjects, Action::Write)?;
                dir.directory_mut()?
                    .remove(name)
                    .ok_or_else(|| StoreError::not_found(path.to_string()))
            })
            .await?;

        let mut pending = vec![removed.child];
        let mut dropped = 0usize;
        while let Some(id) = pending.pop() {
            match coordinator.fetch(&id).await {
                Ok(record) => {
                    if let Ok(dir) = record.directory() {
                        pending.extend(dir.list().into_iter().map(|l| l.child));
                    }
                }
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => tracing::warn!(object = ?id, error = %e, "descendant not inspected"),
            }
            match coordinator.delete(&id).await {
                Ok(()) => dropped += 1,
                Err(e) => tracing::warn!(object = ?id, error = %e, "descendant not removed"),
            }
        }

        tracing::info!(path, dropped, "deleted");
        Ok(())
    }
}

/// Components of a mount relative path; empty for the root
fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.iter().any(|c| *c == "." || *c == "..") {
        return Err(StoreError::invalid(format!("unsupported path: {}", path)));
    }
    Ok(components)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::node::StorageNode;
    use crate::transport::{LocalClient, Membership, NodeClient};

    async fn store() -> MountGateway {
        let membership = Membership::from_clients((0..3).map(|_| {
            Arc::new(LocalClient::new(StorageNode::memory(3))) as Arc<dyn NodeClient>
        }));
        let coordinator = Coordinator::new(membership, ClusterConfig::default(), None);
        MountGateway::create_store(coordinator, Identity::ephemeral("alice"), None)
            .await
            .unwrap()
    }

    #[test]
    fn test_split_path() {
        assert!(split_path("/").unwrap().is_empty());
        assert_eq!(split_path("/a//b/").unwrap(), vec!["a", "b"]);
        assert!(split_path("a/../b").is_err());
    }

    #[tokio::test]
    async fn test_file_size_is_capped() {
        let gateway = store().await;
        gateway.create("/f").await.unwrap();
        let max = gateway.coordinator().config().max_file_size;

        assert!(matches!(
            gateway.truncate("/f", u64::MAX).await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            gateway.write("/f", max, b"x").await,
            Err(StoreError::InvalidArgument(_))
        ));
        gateway.truncate("/f", max - 1).await.unwrap();
        assert!(matches!(
            gateway.append("/f", b"xy").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(gateway.append("/f", b"x").await.unwrap(), max);
        assert_eq!(gateway.stat("/f").await.unwrap().size, max);
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let gateway = store().await;
        gateway.create("/f").await.unwrap();
        assert!(matches!(
            gateway.create("/f").await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            MountGateway::create_store(
                gateway.coordinator().clone(),
                Identity::ephemeral("bob"),
                None
            )
            .await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_file_in_place_of_directory() {
        let gateway = store().await;
        gateway.create("/f").await.unwrap();
        assert!(matches!(
            gateway.create("/f/g").await,
            Err(StoreError::InvalidArgument(_))
        ));
        gateway.mkdir("/d").await.unwrap();
        assert!(matches!(
            gateway.write("/d", 0, b"x").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            gateway.read_all("/missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_dereferences_children() {
        let gateway = store().await;
        gateway.mkdir("/d").await.unwrap();
        gateway.mkdir("/d/e").await.unwrap();
        let leaf = gateway.create("/d/e/leaf").await.unwrap();
        gateway.write("/d/e/leaf", 0, b"bytes").await.unwrap();

        gateway.delete("/d").await.unwrap();
        assert!(gateway.readdir("/").await.unwrap().is_empty());
        assert!(matches!(
            gateway.coordinator().fetch(&leaf).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stat_and_readdir() {
        let gateway = store().await;
        gateway.mkdir("/b").await.unwrap();
        gateway.create("/a").await.unwrap();
        gateway.append("/a", b"12345").await.unwrap();

        let names: Vec<String> = gateway
            .readdir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let stat = gateway.stat("/a").await.unwrap();
        assert_eq!(stat.kind, ObjectKind::File);
        assert_eq!(stat.size, 5);
        assert_eq!(stat.version, 2);
        assert_eq!(stat.mask, 0b111);
    }
}
