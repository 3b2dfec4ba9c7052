//! Ownership ledger
//!
//! Every object carries an [`OwnershipRecord`]: the ordered owner slots that
//! hold its replicas plus a liveness mask with one bit per slot. A set bit
//! means the owner in that slot holds the current content. The mask never
//! exceeds `2^R - 1` because there are never more than R slots.
//!
//! Changes to the owner set or mask are ordered by `epoch`; replicas keep the
//! record with the highest epoch and ignore older ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::StoreError;

/// Storage nodes are identified by their Ed25519 public key
pub type NodeId = PublicKey;

pub const OBJECT_ID_SIZE: usize = 32;

/// Canonical identifier of a file or directory
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OBJECT_ID_SIZE]);

impl ObjectId {
    /// The root directory of a store lives at the all-zero address
    pub const ROOT: ObjectId = ObjectId([0; OBJECT_ID_SIZE]);

    pub fn generate() -> Self {
        let mut bytes = [0u8; OBJECT_ID_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        Self(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<Self, StoreError> {
        let mut buff = [0; OBJECT_ID_SIZE];
        hex::decode_to_slice(hex.trim(), &mut buff)
            .map_err(|_| StoreError::invalid(format!("malformed object id: {}", hex)))?;
        Ok(Self(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_SIZE] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// Two-hex-digit shard used to fan objects out on disk
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl From<[u8; OBJECT_ID_SIZE]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", hex::encode(&self.0[..6]))
    }
}

/// Mask value with the low `slots` bits set
pub fn full_mask(slots: usize) -> u8 {
    if slots >= 8 {
        u8::MAX
    } else {
        ((1u16 << slots) - 1) as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    owners: Vec<NodeId>,
    mask: u8,
    epoch: u64,
}

impl OwnershipRecord {
    /// Fresh record where every owner is live
    pub fn new(owners: Vec<NodeId>) -> Self {
        let mask = full_mask(owners.len());
        Self {
            owners,
            mask,
            epoch: 0,
        }
    }

    pub fn owners(&self) -> &[NodeId] {
        &self.owners
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn slot_of(&self, node: &NodeId) -> Option<usize> {
        self.owners.iter().position(|o| o == node)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.slot_of(node).is_some()
    }

    pub fn is_live(&self, node: &NodeId) -> bool {
        self.slot_of(node)
            .map(|slot| self.mask & (1 << slot) != 0)
            .unwrap_or(false)
    }

    pub fn live_owners(&self) -> Vec<NodeId> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(slot, _)| self.mask & (1 << slot) != 0)
            .map(|(_, node)| *node)
            .collect()
    }

    pub fn stale_owners(&self) -> Vec<NodeId> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(slot, _)| self.mask & (1 << slot) == 0)
            .map(|(_, node)| *node)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Whether the object has R owners that are all up to date
    pub fn is_fully_replicated(&self, replication: usize) -> bool {
        self.owners.len() == replication && self.mask == full_mask(replication)
    }

    /// Mask with exactly the bits of `acked` owners set
    pub fn mask_for(&self, acked: &[NodeId]) -> u8 {
        acked
            .iter()
            .filter_map(|node| self.slot_of(node))
            .fold(0u8, |mask, slot| mask | (1 << slot))
    }

    /// Replace the mask; returns whether it changed
    pub fn set_mask(&mut self, mask: u8) -> bool {
        let mask = mask & full_mask(self.owners.len());
        let changed = mask != self.mask;
        self.mask = mask;
        changed
    }

    pub fn set_live(&mut self, node: &NodeId, live: bool) -> bool {
        match self.slot_of(node) {
            Some(slot) if live => self.set_mask(self.mask | (1 << slot)),
            Some(slot) => self.set_mask(self.mask & !(1 << slot)),
            None => false,
        }
    }

    /// Append an owner slot, returning false if it is already present or
    /// the record is at capacity
    pub fn add(&mut self, node: NodeId, live: bool, replication: usize) -> bool {
        if self.contains(&node) || self.owners.len() >= replication {
            return false;
        }
        self.owners.push(node);
        if live {
            self.mask |= 1 << (self.owners.len() - 1);
        }
        true
    }

    /// Drop the slot held by `node` and shift higher bits down so every
    /// remaining bit still lines up with its owner. Returns false if the
    /// node held no slot.
    pub fn remove(&mut self, node: &NodeId) -> bool {
        let Some(slot) = self.slot_of(node) else {
            return false;
        };
        self.owners.remove(slot);
        let mask = self.mask as u16;
        let lower = mask & ((1u16 << slot) - 1);
        let upper = (mask >> (slot + 1)) << slot;
        self.mask = (lower | upper) as u8;
        true
    }

    pub fn bump(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub fn is_newer_than(&self, other: &OwnershipRecord) -> bool {
        self.epoch > other.epoch
    }

    /// Owner ids, one hex id per line
    pub fn format_owners(&self) -> String {
        self.owners
            .iter()
            .map(|o| o.to_hex())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Order candidate nodes for an object by rendezvous score, best first
///
/// Every client computes the same order for the same set of nodes, so
/// placement needs no coordination.
pub fn rank_nodes(id: &ObjectId, nodes: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
    let mut scored: Vec<([u8; 32], NodeId)> = nodes
        .into_iter()
        .map(|node| {
            let mut hasher = blake3::Hasher::new();
            hasher.update(id.as_bytes());
            hasher.update(node.as_bytes());
            (*hasher.finalize().as_bytes(), node)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().map(|(_, node)| node).collect()
}
