//! Replication coordinator
//!
//! The coordinator runs inside a mount (or a repair tool) and drives the
//! storage nodes that own each object. It never holds state that the nodes
//! do not also hold; the location cache only saves a round of discovery.
//!
//! Versioned changes (file content, capability records) go through
//! [`Coordinator::update`]: lease the live owners at the version we read,
//! apply the change, advance the version and push the whole record. A
//! quorum of leases totally orders writers coming from different mounts.
//!
//! Directory entry changes go through [`Coordinator::update_entries`]
//! without leases. Only the changed entries are shipped to live owners and
//! nodes merge them by union, so concurrent creates never lose each other.
//!
//! After either kind of write the liveness mask is recomputed from the
//! owners that acknowledged, and a resync job is queued for the rest.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};

use crate::config::ClusterConfig;
use crate::error::StoreError;
use crate::jobs::JobDispatcher;
use crate::ledger::{rank_nodes, NodeId, ObjectId, OwnershipRecord};
use crate::node::LockReply;
use crate::object::{Absorbed, ObjectBody, ObjectKind, ObjectRecord};
use crate::transport::{Membership, NodeClient};

/// Lease rounds lost to other writers before giving up
const MAX_CONTENTION: u32 = 64;

#[derive(Debug, Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    membership: Membership,
    config: ClusterConfig,
    locations: RwLock<HashMap<ObjectId, OwnershipRecord>>,
    guards: Mutex<HashMap<ObjectId, Arc<tokio::sync::Mutex<()>>>>,
    jobs: Option<JobDispatcher>,
}

enum Attempt<T> {
    Done(T),
    /// A replica already holds a newer version; read again
    Outdated,
    /// Another writer holds leases on the replicas
    Busy,
    /// Nothing was written; safe to retry if retryable
    Failed(StoreError),
    /// Some replicas may hold the change; must not be re-applied
    Lost(StoreError),
}

impl Coordinator {
    pub fn new(membership: Membership, config: ClusterConfig, jobs: Option<JobDispatcher>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                membership,
                config,
                locations: RwLock::new(HashMap::new()),
                guards: Mutex::new(HashMap::new()),
                jobs,
            }),
        }
    }

    pub fn membership(&self) -> &Membership {
        &self.inner.membership
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    fn replication(&self) -> usize {
        self.inner.config.replication as usize
    }

    /// Bound a replica call by the rpc timeout
    pub(crate) async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.inner.config.rpc_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::unavailable("replica call timed out")),
        }
    }

    /// Client for `node`, refreshing the membership once if it is unknown
    pub(crate) async fn client(&self, node: &NodeId) -> Result<Arc<dyn NodeClient>, StoreError> {
        let membership = &self.inner.membership;
        if let Some(client) = membership.get(node) {
            return Ok(client);
        }
        if let Err(e) = membership.refresh().await {
            tracing::debug!(node = %node.short(), error = %e, "membership refresh failed");
        }
        membership
            .get(node)
            .ok_or_else(|| StoreError::unavailable(format!("node {} is not a member", node.short())))
    }

    fn guard(&self, id: &ObjectId) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .guards
            .lock()
            .entry(*id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Remember `ownership` unless a newer epoch is already cached
    pub fn observe(&self, id: &ObjectId, ownership: &OwnershipRecord) {
        let mut locations = self.inner.locations.write();
        match locations.get(id) {
            Some(known) if !ownership.is_newer_than(known) => {}
            _ => {
                locations.insert(*id, ownership.clone());
            }
        }
    }

    pub fn forget(&self, id: &ObjectId) {
        self.inner.locations.write().remove(id);
    }

    /// Ask every member for its copy of `id`
    ///
    /// Returns the copies found; fails with `Unavailable` only if no node
    /// answered at all.
    pub async fn discover(&self, id: &ObjectId) -> Result<Vec<(NodeId, ObjectRecord)>, StoreError> {
        let clients = self.inner.membership.clients();
        let replies = join_all(clients.iter().map(|c| self.call(c.fetch(id)))).await;

        let mut answered = 0;
        let mut found = Vec::new();
        for (client, reply) in clients.iter().zip(replies) {
            match reply {
                Ok(Some(record)) => {
                    answered += 1;
                    found.push((client.id(), record));
                }
                Ok(None) => answered += 1,
                Err(e) => tracing::debug!(node = %client.id().short(), error = %e, "discovery skipped node"),
            }
        }
        if answered == 0 {
            return Err(StoreError::unavailable("no storage node reachable"));
        }
        Ok(found)
    }

    /// Current ownership of `id`, from cache or by discovery
    pub async fn locate(&self, id: &ObjectId) -> Result<OwnershipRecord, StoreError> {
        if let Some(ownership) = self.inner.locations.read().get(id) {
            return Ok(ownership.clone());
        }
        self.relocate(id).await
    }

    async fn relocate(&self, id: &ObjectId) -> Result<OwnershipRecord, StoreError> {
        let found = self.discover(id).await?;
        let ownership = found
            .into_iter()
            .map(|(_, record)| record.ownership)
            .max_by_key(|ownership| ownership.epoch())
            .ok_or_else(|| StoreError::not_found(format!("object {}", id)))?;
        self.inner.locations.write().insert(*id, ownership.clone());
        Ok(ownership)
    }

    /// Freshest copy held by the live owners in `ownership`
    ///
    /// Directory copies are merged rather than picked.
    pub(crate) async fn read_live(
        &self,
        id: &ObjectId,
        ownership: &OwnershipRecord,
    ) -> Result<ObjectRecord, StoreError> {
        if ownership.mask() == 0 {
            return Err(StoreError::unavailable(format!(
                "object {} has no live replica",
                id
            )));
        }

        let live = ownership.live_owners();
        let replies = join_all(live.iter().map(|node| async move {
            let client = self.client(node).await?;
            self.call(client.fetch(id)).await
        }))
        .await;

        let mut answered = 0;
        let mut best: Option<ObjectRecord> = None;
        for (node, reply) in live.iter().zip(replies) {
            match reply {
                Ok(Some(record)) => {
                    answered += 1;
                    best = Some(match best {
                        None => record,
                        Some(mut current) => {
                            if let Err(e) = current.absorb(record) {
                                tracing::warn!(object = ?id, node = %node.short(), error = %e, "replicas disagree");
                            }
                            current
                        }
                    });
                }
                Ok(None) => answered += 1,
                Err(e) => tracing::debug!(object = ?id, node = %node.short(), error = %e, "live owner did not answer"),
            }
        }

        if answered == 0 {
            return Err(StoreError::unavailable(format!(
                "no live owner of {} answered",
                id
            )));
        }
        let mut record = best.ok_or_else(|| StoreError::not_found(format!("object {}", id)))?;
        if ownership.is_newer_than(&record.ownership) {
            record.ownership = ownership.clone();
        }
        Ok(record)
    }

    /// Read the freshest live replica of `id`
    pub async fn fetch(&self, id: &ObjectId) -> Result<ObjectRecord, StoreError> {
        let ownership = self.locate(id).await?;
        let record = match self.read_live(id, &ownership).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_) | StoreError::Unavailable(_)) => {
                // repair may have moved the object since it was cached
                let fresh = self.relocate(id).await?;
                self.read_live(id, &fresh).await?
            }
            Err(e) => return Err(e),
        };
        self.observe(id, &record.ownership);
        Ok(record)
    }

    /// Union of every object id held by any answering node
    pub async fn object_ids(&self) -> Result<BTreeSet<ObjectId>, StoreError> {
        let clients = self.inner.membership.clients();
        let replies = join_all(clients.iter().map(|c| self.call(c.list()))).await;

        let mut answered = 0;
        let mut ids = BTreeSet::new();
        for (client, reply) in clients.iter().zip(replies) {
            match reply {
                Ok(listed) => {
                    answered += 1;
                    ids.extend(listed);
                }
                Err(e) => tracing::debug!(node = %client.id().short(), error = %e, "listing skipped node"),
            }
        }
        if answered == 0 {
            return Err(StoreError::unavailable("no storage node reachable"));
        }
        Ok(ids)
    }

    /// Place a new object on the top ranked reachable nodes
    pub async fn insert(&self, mut record: ObjectRecord) -> Result<ObjectRecord, StoreError> {
        let mut failures = 0;
        loop {
            match self.try_insert(&mut record).await {
                Ok(()) => return Ok(record),
                Err(e) if e.is_retryable() && failures < self.inner.config.write_retries => {
                    failures += 1;
                    tracing::debug!(object = ?record.id, attempt = failures, error = %e, "retrying insert");
                    tokio::time::sleep(self.inner.config.retry_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_insert(&self, record: &mut ObjectRecord) -> Result<(), StoreError> {
        let quorum = self.inner.config.quorum();
        let reachable = self.inner.membership.reachable().await;
        let owners: Vec<NodeId> = rank_nodes(&record.id, reachable.iter().map(|c| c.id()))
            .into_iter()
            .take(self.replication())
            .collect();
        if owners.len() < quorum {
            return Err(StoreError::unavailable(format!(
                "{} storage nodes reachable, need {}",
                owners.len(),
                quorum
            )));
        }

        record.ownership = OwnershipRecord::new(owners.clone());
        let sends: Vec<(NodeId, &ObjectRecord)> = owners.iter().map(|n| (*n, &*record)).collect();
        let acked = self.store_phase(sends, None).await;
        if acked.len() < quorum {
            return Err(StoreError::unavailable(format!(
                "insert of {} reached {} of {} owners",
                record.id,
                acked.len(),
                owners.len()
            )));
        }

        self.settle(record, &acked).await;
        tracing::info!(object = ?record.id, kind = %record.kind(), mask = record.ownership.mask(), "inserted object");
        Ok(())
    }

    /// Versioned read-modify-write of `id`
    ///
    /// `apply` may run more than once when other writers get in first, but
    /// its effect is committed at most once.
    pub async fn update<T, F>(&self, id: &ObjectId, mut apply: F) -> Result<T, StoreError>
    where
        F: FnMut(&mut ObjectRecord) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let guard = self.guard(id);
        let _held = guard.lock().await;

        let mut failures = 0;
        let mut contended = 0;
        loop {
            let attempt = match self.fetch(id).await {
                Ok(current) => self.try_update(current, &mut apply).await,
                Err(e) => Attempt::Failed(e),
            };
            match attempt {
                Attempt::Done(value) => return Ok(value),
                Attempt::Outdated => contended += 1,
                Attempt::Busy => {
                    contended += 1;
                    tokio::time::sleep(self.jitter()).await;
                }
                Attempt::Failed(e) if e.is_retryable() && failures < self.inner.config.write_retries => {
                    failures += 1;
                    tracing::debug!(object = ?id, attempt = failures, error = %e, "retrying write");
                    tokio::time::sleep(self.inner.config.retry_backoff()).await;
                }
                Attempt::Failed(e) | Attempt::Lost(e) => return Err(e),
            }
            if contended > MAX_CONTENTION {
                return Err(StoreError::unavailable(format!(
                    "object {} is contended by other writers",
                    id
                )));
            }
        }
    }

    async fn try_update<T, F>(&self, mut record: ObjectRecord, apply: &mut F) -> Attempt<T>
    where
        F: FnMut(&mut ObjectRecord) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let quorum = self.inner.config.quorum();
        let id = record.id;
        let base_version = record.version;
        let token = random_u64();
        let live = record.ownership.live_owners();

        let replies = join_all(live.iter().map(|node| async move {
            let client = self.client(node).await?;
            self.call(client.lock(&id, token, base_version)).await
        }))
        .await;

        let mut granted = Vec::new();
        let mut busy = false;
        let mut outdated = false;
        for (node, reply) in live.iter().zip(replies) {
            match reply {
                Ok(LockReply::Granted) => granted.push(*node),
                Ok(LockReply::Busy) => busy = true,
                Ok(LockReply::Outdated { .. }) => outdated = true,
                Err(e) => tracing::debug!(object = ?id, node = %node.short(), error = %e, "lease not taken"),
            }
        }
        if outdated || granted.len() < quorum {
            self.release(&id, token, &granted).await;
            return if outdated {
                Attempt::Outdated
            } else if busy {
                Attempt::Busy
            } else {
                Attempt::Failed(StoreError::unavailable(format!(
                    "write quorum for {} not reached: {} of {} live owners",
                    id,
                    granted.len(),
                    live.len()
                )))
            };
        }

        let value = match apply(&mut record) {
            Ok(value) => value,
            Err(e) => {
                self.release(&id, token, &granted).await;
                return Attempt::Failed(e);
            }
        };
        record.advance();

        // stale owners that answer get the whole record and catch up
        let mut targets = granted.clone();
        targets.extend(record.ownership.stale_owners());
        let sends: Vec<(NodeId, &ObjectRecord)> = targets.iter().map(|n| (*n, &record)).collect();
        let acked = self.store_phase(sends, Some(token)).await;

        if acked.len() < quorum {
            let unacked: Vec<NodeId> = granted
                .iter()
                .filter(|n| !acked.contains(n))
                .copied()
                .collect();
            self.release(&id, token, &unacked).await;
            return Attempt::Lost(StoreError::unavailable(format!(
                "write to {} reached {} replicas, quorum is {}",
                id,
                acked.len(),
                quorum
            )));
        }

        self.settle(&mut record, &acked).await;
        tracing::info!(object = ?id, version = record.version, mask = record.ownership.mask(), "committed write");
        Attempt::Done(value)
    }

    /// Change the entries of directory `id`
    ///
    /// Only entry changes made by `apply` are propagated; capability or
    /// version changes must go through [`Coordinator::update`]. Entry
    /// changes from this coordinator are serialized per directory, so two
    /// of them never derive the same op id from the same clock.
    pub async fn update_entries<T, F>(&self, id: &ObjectId, mut apply: F) -> Result<T, StoreError>
    where
        F: FnMut(&mut ObjectRecord) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let guard = self.guard(id);
        let _held = guard.lock().await;

        let quorum = self.inner.config.quorum();
        let mut failures = 0;
        let mut record = loop {
            match self.fetch(id).await {
                Ok(record) => break record,
                Err(e) if e.is_retryable() && failures < self.inner.config.write_retries => {
                    failures += 1;
                    tokio::time::sleep(self.inner.config.retry_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        };
        if record.kind() != ObjectKind::Directory {
            return Err(StoreError::invalid("not a directory"));
        }

        let before = record.directory()?.clone();
        let value = apply(&mut record)?;
        let changes = record.directory()?.changes_since(&before);
        if changes.history_len() == 0 {
            return Ok(value);
        }

        let full_body = std::mem::replace(&mut record.body, ObjectBody::Directory(changes));
        let delta = record.clone();
        record.body = full_body;

        let mut sends: Vec<(NodeId, &ObjectRecord)> = Vec::new();
        for node in record.ownership.owners() {
            if record.ownership.is_live(node) {
                sends.push((*node, &delta));
            } else {
                sends.push((*node, &record));
            }
        }
        let acked = self.store_phase(sends, None).await;
        if acked.len() < quorum {
            return Err(StoreError::unavailable(format!(
                "entry change on {} reached {} replicas, quorum is {}",
                id,
                acked.len(),
                quorum
            )));
        }

        self.settle(&mut record, &acked).await;
        tracing::debug!(object = ?id, mask = record.ownership.mask(), "merged directory entries");
        Ok(value)
    }

    /// Remove `id` from every owner that answers
    pub async fn delete(&self, id: &ObjectId) -> Result<(), StoreError> {
        let ownership = self.locate(id).await?;
        let owners = ownership.owners().to_vec();
        let replies = join_all(owners.iter().map(|node| async move {
            let client = self.client(node).await?;
            self.call(client.remove(id)).await
        }))
        .await;

        let mut removed = 0;
        for (node, reply) in owners.iter().zip(replies) {
            match reply {
                Ok(_) => removed += 1,
                Err(e) => tracing::warn!(object = ?id, node = %node.short(), error = %e, "replica not removed"),
            }
        }
        self.forget(id);
        self.inner.guards.lock().remove(id);

        if removed == 0 && !owners.is_empty() {
            return Err(StoreError::unavailable(format!("no owner of {} answered", id)));
        }
        tracing::info!(object = ?id, removed, "deleted object");
        Ok(())
    }

    /// Send each record to its node, retrying until a quorum acknowledges
    ///
    /// Replicas refusing because another writer's lease is still active are
    /// retried even after quorum is reached, since the lease is short lived.
    async fn store_phase(
        &self,
        sends: Vec<(NodeId, &ObjectRecord)>,
        token: Option<u64>,
    ) -> Vec<NodeId> {
        let quorum = self.inner.config.quorum();
        let mut pending = sends;
        let mut acked = Vec::new();

        for round in 0..=self.inner.config.write_retries {
            if round > 0 {
                tokio::time::sleep(self.inner.config.retry_backoff()).await;
            }
            let replies = join_all(pending.iter().map(|(node, record)| async move {
                let client = self.client(node).await?;
                self.call(client.store(record, token)).await
            }))
            .await;

            let mut retry = Vec::new();
            let mut leased = Vec::new();
            for ((node, record), reply) in pending.into_iter().zip(replies) {
                match reply {
                    Ok(Absorbed::Outdated { version })
                        if record.kind() == ObjectKind::File && version != record.version =>
                    {
                        tracing::warn!(object = ?record.id, node = %node.short(), version, "replica holds a newer version");
                    }
                    Ok(_) => acked.push(node),
                    Err(e @ StoreError::Conflict(_)) => {
                        tracing::debug!(object = ?record.id, node = %node.short(), error = %e, "replica leased by another writer");
                        leased.push((node, record));
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(object = ?record.id, node = %node.short(), error = %e, "replica did not acknowledge");
                        retry.push((node, record));
                    }
                    Err(e) => {
                        tracing::warn!(object = ?record.id, node = %node.short(), error = %e, "replica rejected record");
                    }
                }
            }

            // unreachable owners stay stale once quorum is met
            if acked.len() >= quorum {
                if round > 0 {
                    break;
                }
                retry = leased;
            } else {
                retry.extend(leased);
            }
            if retry.is_empty() {
                break;
            }
            pending = retry;
        }
        acked
    }

    /// Recompute the mask from `acked`, publish it if it moved, and queue a
    /// resync for owners left behind
    async fn settle(&self, record: &mut ObjectRecord, acked: &[NodeId]) {
        let mut ownership = record.ownership.clone();
        let mask = ownership.mask_for(acked);
        if ownership.set_mask(mask) {
            ownership.bump();
            self.publish(&record.id, &ownership, acked).await;
        }
        record.ownership = ownership;
        self.observe(&record.id, &record.ownership);

        if record.ownership.live_count() < record.ownership.owners().len() {
            if let Some(jobs) = &self.inner.jobs {
                if let Err(e) = jobs.dispatch_resync(record.id) {
                    tracing::warn!(object = ?record.id, error = %e, "resync not queued");
                }
            }
        }
    }

    /// Push `ownership` to `targets`; returns the nodes that accepted it
    pub(crate) async fn publish(
        &self,
        id: &ObjectId,
        ownership: &OwnershipRecord,
        targets: &[NodeId],
    ) -> Vec<NodeId> {
        let replies = join_all(targets.iter().map(|node| async move {
            let client = self.client(node).await?;
            self.call(client.set_ownership(id, ownership)).await
        }))
        .await;

        let mut accepted = Vec::new();
        for (node, reply) in targets.iter().zip(replies) {
            match reply {
                Ok(_) => accepted.push(*node),
                Err(e) => tracing::warn!(object = ?id, node = %node.short(), error = %e, "ownership not published"),
            }
        }
        self.observe(id, ownership);
        accepted
    }

    async fn release(&self, id: &ObjectId, token: u64, nodes: &[NodeId]) {
        join_all(nodes.iter().map(|node| async move {
            if let Ok(client) = self.client(node).await {
                let _ = self.call(client.unlock(id, token)).await;
            }
        }))
        .await;
    }

    fn jitter(&self) -> Duration {
        let base = self.inner.config.retry_backoff().as_millis().max(2) as u64;
        Duration::from_millis(base / 2 + random_u64() % base)
    }
}

fn random_u64() -> u64 {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::CapabilityRecord;
    use crate::crypto::SecretKey;
    use crate::node::StorageNode;
    use crate::object::OpId;
    use crate::transport::LocalClient;

    fn cluster(n: usize) -> (Vec<LocalClient>, Coordinator) {
        let clients: Vec<LocalClient> = (0..n)
            .map(|_| LocalClient::new(StorageNode::memory(3)))
            .collect();
        let membership = Membership::from_clients(
            clients
                .iter()
                .map(|c| Arc::new(c.clone()) as Arc<dyn NodeClient>),
        );
        let config = ClusterConfig {
            retry_backoff_ms: 5,
            ..ClusterConfig::with_replication(3)
        };
        (clients, Coordinator::new(membership, config, None))
    }

    fn file() -> ObjectRecord {
        ObjectRecord::new_file(
            ObjectId::generate(),
            CapabilityRecord::new(SecretKey::generate().public()),
            4,
        )
    }

    fn by_id<'a>(clients: &'a [LocalClient], node: &NodeId) -> &'a LocalClient {
        clients.iter().find(|c| c.id() == *node).unwrap()
    }

    #[tokio::test]
    async fn test_insert_sets_full_mask() {
        let (_clients, coordinator) = cluster(4);
        let record = coordinator.insert(file()).await.unwrap();
        assert_eq!(record.ownership.owners().len(), 3);
        assert_eq!(record.ownership.mask(), 0b111);
    }

    #[tokio::test]
    async fn test_insert_needs_quorum() {
        let (clients, coordinator) = cluster(3);
        clients[0].set_reachable(false);
        clients[1].set_reachable(false);
        assert!(matches!(
            coordinator.insert(file()).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_write_with_owner_down_clears_bit() {
        let (clients, coordinator) = cluster(3);
        let record = coordinator.insert(file()).await.unwrap();
        let down = record.ownership.owners()[1];
        by_id(&clients, &down).set_reachable(false);

        coordinator
            .update(&record.id, |r| r.file_mut()?.append(b"hello world"))
            .await
            .unwrap();
        let current = coordinator.fetch(&record.id).await.unwrap();
        assert_eq!(current.ownership.mask(), 0b101);
        assert_eq!(current.file().unwrap().read_all(), b"hello world");

        // the next write reaching the owner brings it back
        by_id(&clients, &down).set_reachable(true);
        coordinator
            .update(&record.id, |r| r.file_mut()?.append(b"!"))
            .await
            .unwrap();
        let current = coordinator.fetch(&record.id).await.unwrap();
        assert_eq!(current.ownership.mask(), 0b111);
        let copy = by_id(&clients, &down)
            .node()
            .fetch(&record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copy.file().unwrap().read_all(), b"hello world!");
    }

    #[tokio::test]
    async fn test_read_with_no_live_owner_is_unavailable() {
        let (clients, coordinator) = cluster(3);
        let record = coordinator.insert(file()).await.unwrap();
        for client in &clients {
            client.set_reachable(false);
        }
        assert!(matches!(
            coordinator.fetch(&record.id).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_are_ordered() {
        let (clients, first) = cluster(3);
        let membership = first.membership().clone();
        let second = Coordinator::new(membership, first.config().clone(), None);
        let record = first.insert(file()).await.unwrap();

        let a = {
            let first = first.clone();
            let id = record.id;
            tokio::spawn(async move {
                for _ in 0..20 {
                    first.update(&id, |r| r.file_mut()?.append(b"a")).await.unwrap();
                }
            })
        };
        let b = {
            let second = second.clone();
            let id = record.id;
            tokio::spawn(async move {
                for _ in 0..20 {
                    second.update(&id, |r| r.file_mut()?.append(b"b")).await.unwrap();
                }
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        let current = first.fetch(&record.id).await.unwrap();
        assert_eq!(current.file().unwrap().len(), 40);
        assert_eq!(current.version, 41);
        for client in &clients {
            let copy = client.node().fetch(&record.id).await.unwrap().unwrap();
            assert_eq!(copy.file().unwrap(), current.file().unwrap());
        }
    }

    #[tokio::test]
    async fn test_entries_merge_without_leases() {
        let (_clients, coordinator) = cluster(3);
        let owner = SecretKey::generate().public();
        let dir = coordinator
            .insert(ObjectRecord::new_directory(
                ObjectId::generate(),
                CapabilityRecord::new(owner),
            ))
            .await
            .unwrap();

        let origin = uuid::Uuid::new_v4();
        for i in 0..10u64 {
            coordinator
                .update_entries(&dir.id, |r| {
                    let entries = r.directory_mut()?;
                    let op = OpId {
                        timestamp: entries.clock() + 1,
                        origin,
                    };
                    entries.insert(format!("f{}", i), op, ObjectId::generate(), ObjectKind::File);
                    Ok(())
                })
                .await
                .unwrap();
        }
        let current = coordinator.fetch(&dir.id).await.unwrap();
        assert_eq!(current.directory().unwrap().len(), 10);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_delete_and_rediscover() {
        let (_clients, coordinator) = cluster(3);
        let record = coordinator.insert(file()).await.unwrap();

        let other = Coordinator::new(
            coordinator.membership().clone(),
            coordinator.config().clone(),
            None,
        );
        // an empty cache finds the object by asking the nodes
        assert_eq!(other.fetch(&record.id).await.unwrap().id, record.id);

        coordinator.delete(&record.id).await.unwrap();
        assert!(matches!(
            other.fetch(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
