//! Membership repair: evict and heal
//!
//! Both are operator actions run out of band against a live cluster. Evict
//! rewrites ownership without ever contacting the evicted node. Heal copies
//! snapshots to stale or new owners without taking leases, then re-checks
//! the source version before publishing the new liveness mask.

use std::collections::BTreeSet;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::coordinator::Coordinator;
use crate::error::StoreError;
use crate::jobs::{Job, JobReceiver};
use crate::ledger::{rank_nodes, NodeId, ObjectId, OwnershipRecord};
use crate::object::{Absorbed, ObjectKind, ObjectRecord};

/// Copy rounds per object before settling for what the owners hold
const MAX_COPY_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictReport {
    pub scanned: usize,
    pub updated: usize,
    /// Objects whose ownership could not be read; a later run covers them
    #[serde(default)]
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealReport {
    pub scanned: usize,
    pub resynced: usize,
    pub added: usize,
}

impl std::ops::AddAssign for HealReport {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.resynced += other.resynced;
        self.added += other.added;
    }
}

#[derive(Debug, Clone)]
pub struct RepairService {
    coordinator: Coordinator,
}

impl RepairService {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Drop `node` from every ownership record in the cluster
    ///
    /// The node is also removed from the local membership view so no later
    /// placement picks it again.
    pub async fn evict(&self, node: &NodeId) -> Result<EvictReport, StoreError> {
        let membership = self.coordinator.membership();
        membership.remove(node);

        let ids = self.coordinator.object_ids().await?;
        let mut report = EvictReport::default();
        for id in ids {
            report.scanned += 1;
            let mut ownership = match self.latest_ownership(&id).await {
                Ok(Some(ownership)) => ownership,
                Ok(None) => continue,
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(object = ?id, error = %e, "ownership not read, object skipped");
                    continue;
                }
            };
            if !ownership.remove(node) {
                continue;
            }
            ownership.bump();
            let owners = ownership.owners().to_vec();
            self.coordinator.publish(&id, &ownership, &owners).await;
            report.updated += 1;
            tracing::info!(object = ?id, node = %node.short(), mask = ownership.mask(), "evicted owner");
        }

        tracing::info!(
            node = %node.short(),
            scanned = report.scanned,
            updated = report.updated,
            skipped = report.skipped,
            "eviction finished"
        );
        Ok(report)
    }

    /// Restore every object to R live owners where the cluster allows it
    pub async fn heal(&self) -> Result<HealReport, StoreError> {
        let ids = self.coordinator.object_ids().await?;
        let mut report = HealReport::default();
        for id in ids {
            report.scanned += 1;
            match self.heal_object(&id, true).await {
                Ok(healed) => report += healed,
                Err(e) => tracing::warn!(object = ?id, error = %e, "object not healed"),
            }
        }
        tracing::info!(
            scanned = report.scanned,
            resynced = report.resynced,
            added = report.added,
            "heal finished"
        );
        Ok(report)
    }

    /// Bring the reachable stale owners of `id` up to date
    pub async fn resync(&self, id: &ObjectId) -> Result<HealReport, StoreError> {
        self.heal_object(id, false).await
    }

    async fn latest_ownership(&self, id: &ObjectId) -> Result<Option<OwnershipRecord>, StoreError> {
        let found = self.coordinator.discover(id).await?;
        Ok(found
            .into_iter()
            .map(|(_, record)| record.ownership)
            .max_by_key(|ownership| ownership.epoch()))
    }

    async fn heal_object(&self, id: &ObjectId, fill: bool) -> Result<HealReport, StoreError> {
        let replication = self.coordinator.config().replication as usize;
        let Some(ownership) = self.latest_ownership(id).await? else {
            return Ok(HealReport::default());
        };
        self.coordinator.observe(id, &ownership);

        let reachable: BTreeSet<NodeId> = self
            .coordinator
            .membership()
            .reachable()
            .await
            .iter()
            .map(|c| c.id())
            .collect();

        let stale: Vec<NodeId> = ownership
            .stale_owners()
            .into_iter()
            .filter(|n| reachable.contains(n))
            .collect();
        let mut added = Vec::new();
        if fill && ownership.owners().len() < replication {
            let candidates = reachable
                .iter()
                .filter(|n| !ownership.contains(n))
                .copied();
            added = rank_nodes(id, candidates)
                .into_iter()
                .take(replication - ownership.owners().len())
                .collect();
        }
        if stale.is_empty() && added.is_empty() {
            return Ok(HealReport::default());
        }

        let mut targets = stale.clone();
        targets.extend(added.iter().copied());
        let (snapshot, copied) = self.copy_snapshot(id, &ownership, &targets).await?;

        let mut next = snapshot.ownership.clone();
        if ownership.is_newer_than(&next) {
            next = ownership;
        }
        let mut report = HealReport::default();
        for node in &copied {
            if stale.contains(node) {
                next.set_live(node, true);
                report.resynced += 1;
            } else if next.add(*node, true, replication) {
                report.added += 1;
            }
        }
        if report.resynced == 0 && report.added == 0 {
            return Ok(report);
        }

        next.bump();
        let owners: Vec<NodeId> = next
            .owners()
            .iter()
            .filter(|n| reachable.contains(n))
            .copied()
            .collect();
        self.coordinator.publish(id, &next, &owners).await;
        tracing::info!(
            object = ?id,
            resynced = report.resynced,
            added = report.added,
            mask = next.mask(),
            "healed object"
        );
        Ok(report)
    }

    /// Copy the freshest live copy of `id` to `targets`
    ///
    /// A write landing during the copy changes the source version, in which
    /// case the copy is repeated. Returns the snapshot the targets finally
    /// hold and the targets that acknowledged it.
    async fn copy_snapshot(
        &self,
        id: &ObjectId,
        ownership: &OwnershipRecord,
        targets: &[NodeId],
    ) -> Result<(ObjectRecord, Vec<NodeId>), StoreError> {
        let mut snapshot = self.coordinator.read_live(id, ownership).await?;
        let mut copied = Vec::new();

        for round in 0..MAX_COPY_ROUNDS {
            let replies = join_all(targets.iter().map(|node| {
                let snapshot = &snapshot;
                async move {
                    let client = self.coordinator.client(node).await?;
                    self.coordinator.call(client.store(snapshot, None)).await
                }
            }))
            .await;

            copied.clear();
            for (node, reply) in targets.iter().zip(replies) {
                match reply {
                    Ok(Absorbed::Outdated { version })
                        if snapshot.kind() == ObjectKind::File && version != snapshot.version =>
                    {
                        tracing::debug!(object = ?id, node = %node.short(), version, "target ahead of snapshot");
                    }
                    Ok(_) => copied.push(*node),
                    Err(e) => tracing::warn!(object = ?id, node = %node.short(), error = %e, "copy failed"),
                }
            }

            let current = self.coordinator.read_live(id, &snapshot.ownership).await?;
            let moved = match current.kind() {
                ObjectKind::File => current.freshness() != snapshot.freshness(),
                ObjectKind::Directory => {
                    current.version != snapshot.version
                        || current.directory()?.history_len()
                            != snapshot.directory()?.history_len()
                }
            };
            if !moved {
                break;
            }
            tracing::debug!(object = ?id, round, "source moved during copy");
            snapshot = current;
        }
        Ok((snapshot, copied))
    }
}

/// Drain resync jobs until every dispatcher is dropped
pub fn spawn_resync_worker(service: RepairService, jobs: JobReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let mut pending = BTreeSet::new();
            let Job::Resync { id } = job;
            pending.insert(id);
            while let Some(Job::Resync { id }) = jobs.try_recv() {
                pending.insert(id);
            }

            for id in pending {
                match service.resync(&id).await {
                    Ok(report) if report.resynced > 0 => {
                        tracing::info!(object = ?id, resynced = report.resynced, "resync finished")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!(object = ?id, error = %e, "resync skipped"),
                }
            }
        }
        tracing::debug!("resync worker stopped");
    })
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::capability::CapabilityRecord;
    use crate::config::ClusterConfig;
    use crate::crypto::SecretKey;
    use crate::node::StorageNode;
    use crate::node::{LockReply, NodeInfo};
    use crate::transport::{LocalClient, Membership, NodeClient};

    /// Lists `hidden` but cannot serve it
    #[derive(Debug)]
    struct HiddenObject {
        inner: LocalClient,
        hidden: ObjectId,
    }

    #[async_trait::async_trait]
    impl NodeClient for HiddenObject {
        fn id(&self) -> NodeId {
            self.inner.id()
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }

        async fn info(&self) -> Result<NodeInfo, StoreError> {
            self.inner.info().await
        }

        async fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
            if *id == self.hidden {
                return Err(StoreError::unavailable("object shard offline"));
            }
            self.inner.fetch(id).await
        }

        async fn lock(
            &self,
            id: &ObjectId,
            token: u64,
            base_version: u64,
        ) -> Result<LockReply, StoreError> {
            self.inner.lock(id, token, base_version).await
        }

        async fn unlock(&self, id: &ObjectId, token: u64) -> Result<(), StoreError> {
            self.inner.unlock(id, token).await
        }

        async fn store(
            &self,
            record: &ObjectRecord,
            token: Option<u64>,
        ) -> Result<Absorbed, StoreError> {
            self.inner.store(record, token).await
        }

        async fn set_ownership(
            &self,
            id: &ObjectId,
            ownership: &OwnershipRecord,
        ) -> Result<bool, StoreError> {
            self.inner.set_ownership(id, ownership).await
        }

        async fn remove(&self, id: &ObjectId) -> Result<bool, StoreError> {
            self.inner.remove(id).await
        }

        async fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
            let mut ids = self.inner.list().await?;
            ids.push(self.hidden);
            Ok(ids)
        }
    }

    fn cluster(n: usize) -> (Vec<LocalClient>, RepairService) {
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
        let coordinator = Coordinator::new(membership, config, None);
        (clients, RepairService::new(coordinator))
    }

    fn file() -> ObjectRecord {
        ObjectRecord::new_file(
            ObjectId::generate(),
            CapabilityRecord::new(SecretKey::generate().public()),
            4,
        )
    }

    #[tokio::test]
    async fn test_evict_is_idempotent_and_never_contacts_node() {
        let (clients, repair) = cluster(3);
        let coordinator = repair.coordinator().clone();
        let record = coordinator.insert(file()).await.unwrap();
        let victim = record.ownership.owners()[0];
        clients
            .iter()
            .find(|c| c.id() == victim)
            .unwrap()
            .set_reachable(false);

        let report = repair.evict(&victim).await.unwrap();
        assert_eq!(report.updated, 1);
        let current = coordinator.fetch(&record.id).await.unwrap();
        assert!(!current.ownership.contains(&victim));
        assert_eq!(current.ownership.mask(), 0b11);

        let again = repair.evict(&victim).await.unwrap();
        assert_eq!(again.updated, 0);
    }

    #[tokio::test]
    async fn test_heal_fills_slots_after_evict() {
        let (clients, repair) = cluster(4);
        let coordinator = repair.coordinator().clone();
        let record = coordinator.insert(file()).await.unwrap();
        coordinator
            .update(&record.id, |r| r.file_mut()?.append(b"payload"))
            .await
            .unwrap();

        let victim = record.ownership.owners()[2];
        repair.evict(&victim).await.unwrap();
        let report = repair.heal().await.unwrap();
        assert_eq!(report.added, 1);

        let current = coordinator.fetch(&record.id).await.unwrap();
        assert_eq!(current.ownership.owners().len(), 3);
        assert_eq!(current.ownership.mask(), 0b111);
        for owner in current.ownership.owners() {
            let client = clients.iter().find(|c| c.id() == *owner).unwrap();
            let copy = client.node().fetch(&record.id).await.unwrap().unwrap();
            assert_eq!(copy.file().unwrap().read_all(), b"payload");
        }

        // nothing left to do
        let again = repair.heal().await.unwrap();
        assert_eq!(again.added + again.resynced, 0);
    }

    #[tokio::test]
    async fn test_resync_restores_returning_owner() {
        let (clients, repair) = cluster(3);
        let coordinator = repair.coordinator().clone();
        let record = coordinator.insert(file()).await.unwrap();
        let down = record.ownership.owners()[0];
        let down_client = clients.iter().find(|c| c.id() == down).unwrap();

        down_client.set_reachable(false);
        coordinator
            .update(&record.id, |r| r.file_mut()?.append(b"abc"))
            .await
            .unwrap();
        assert_eq!(coordinator.fetch(&record.id).await.unwrap().ownership.mask(), 0b110);

        // still unreachable: nothing to do
        assert_eq!(repair.resync(&record.id).await.unwrap().resynced, 0);

        down_client.set_reachable(true);
        assert_eq!(repair.resync(&record.id).await.unwrap().resynced, 1);
        assert_eq!(coordinator.fetch(&record.id).await.unwrap().ownership.mask(), 0b111);
    }

    #[tokio::test]
    async fn test_evict_skips_unreadable_object() {
        let (clients, repair) = cluster(3);
        let record = repair.coordinator().insert(file()).await.unwrap();
        let victim = record.ownership.owners()[0];

        let hidden = ObjectId::generate();
        let membership = Membership::from_clients(clients.iter().map(|c| {
            Arc::new(HiddenObject {
                inner: c.clone(),
                hidden,
            }) as Arc<dyn NodeClient>
        }));
        let flaky = RepairService::new(Coordinator::new(
            membership,
            repair.coordinator().config().clone(),
            None,
        ));

        let report = flaky.evict(&victim).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 1);
        let survivor = record.ownership.owners()[1];
        let client = clients.iter().find(|c| c.id() == survivor).unwrap();
        let copy = client.node().fetch(&record.id).await.unwrap().unwrap();
        assert!(!copy.ownership.contains(&victim));
    }
}
