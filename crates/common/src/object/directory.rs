//! Directory entries as a state-based CRDT
//!
//! Entries are keyed by `(name, origin op)` and never overwritten: merging
//! two replicas is a plain union, and removal sets a tombstone that also
//! wins on merge. Concurrent creates of distinct names from different
//! mounts therefore all survive.
//!
//! Two live entries under the same name resolve deterministically: the
//! entry with the smallest [`OpId`] (earliest Lamport time, then origin)
//! keeps the name and every later one is listed as
//! `<stem>@<timestamp>-<origin>.<ext>`, so no content is lost.
//!
//! Tombstones are never compacted. A replica that missed a removal can come
//! back at any time, and dropping the tombstone would let its copy of the
//! entry resurrect on merge, so a directory record grows with every create
//! it has ever seen. Each tombstone holds a name, an op id and a child id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use uuid::Uuid;

use crate::ledger::ObjectId;

use super::ObjectKind;

/// Origin of a directory mutation
///
/// Ordered by Lamport timestamp, then by the originating mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    pub timestamp: u64,
    pub origin: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub child: ObjectId,
    pub kind: ObjectKind,
    pub removed: bool,
}

/// A live entry as listed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub child: ObjectId,
    pub kind: ObjectKind,
    pub op: OpId,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    #[serde_as(as = "Vec<(_, _)>")]
    entries: BTreeMap<(String, OpId), DirEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest Lamport timestamp seen
    pub fn clock(&self) -> u64 {
        self.entries
            .keys()
            .map(|(_, op)| op.timestamp)
            .max()
            .unwrap_or(0)
    }

    pub fn next_op(&self, origin: Uuid) -> OpId {
        OpId {
            timestamp: self.clock() + 1,
            origin,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, op: OpId, child: ObjectId, kind: ObjectKind) {
        self.entries.entry((name.into(), op)).or_insert(DirEntry {
            child,
            kind,
            removed: false,
        });
    }

    /// Tombstone the entry currently listed as `name`
    pub fn remove(&mut self, name: &str) -> Option<Listing> {
        let listing = self.lookup(name)?;
        let key = self
            .entries
            .iter()
            .find(|((_, op), e)| *op == listing.op && e.child == listing.child)
            .map(|(key, _)| key.clone())?;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.removed = true;
        }
        Some(listing)
    }

    /// Union with another replica; returns whether anything changed
    pub fn merge(&mut self, other: &Directory) -> bool {
        let mut changed = false;
        for (key, theirs) in &other.entries {
            match self.entries.get_mut(key) {
                Some(ours) => {
                    if theirs.removed && !ours.removed {
                        ours.removed = true;
                        changed = true;
                    }
                }
                None => {
                    self.entries.insert(key.clone(), theirs.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Entries added or tombstoned relative to `before`
    ///
    /// Merging the result into any replica that already holds `before`
    /// yields the same state as merging `self`.
    pub fn changes_since(&self, before: &Directory) -> Directory {
        let entries = self
            .entries
            .iter()
            .filter(|(key, entry)| before.entries.get(*key) != Some(*entry))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        Directory { entries }
    }

    /// Live entries with collisions resolved, sorted by listed name
    pub fn list(&self) -> Vec<Listing> {
        let mut by_name: BTreeMap<&str, Vec<(&OpId, &DirEntry)>> = BTreeMap::new();
        for ((name, op), entry) in &self.entries {
            if !entry.removed {
                by_name.entry(name.as_str()).or_default().push((op, entry));
            }
        }

        let mut out = Vec::new();
        for (name, mut claims) in by_name {
            claims.sort_by(|a, b| a.0.cmp(b.0));
            for (i, (op, entry)) in claims.into_iter().enumerate() {
                let listed = if i == 0 {
                    name.to_string()
                } else {
                    conflict_name(name, op)
                };
                out.push(Listing {
                    name: listed,
                    child: entry.child,
                    kind: entry.kind,
                    op: *op,
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn lookup(&self, name: &str) -> Option<Listing> {
        // the earliest live claim on a plain name owns it
        let winner = self
            .entries
            .range((name.to_string(), OpId::MIN)..)
            .take_while(|((n, _), _)| n == name)
            .find(|(_, e)| !e.removed);
        if let Some(((_, op), entry)) = winner {
            return Some(Listing {
                name: name.to_string(),
                child: entry.child,
                kind: entry.kind,
                op: *op,
            });
        }
        if !name.contains('@') {
            return None;
        }
        self.list().into_iter().find(|l| l.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of every key ever recorded, tombstones included
    pub fn history_len(&self) -> usize {
        self.entries.len()
    }
}

impl OpId {
    pub const MIN: OpId = OpId {
        timestamp: 0,
        origin: Uuid::nil(),
    };
}

/// Listed name for a losing claim: `<stem>@<timestamp>-<origin>.<ext>`
pub fn conflict_name(name: &str, op: &OpId) -> String {
    let origin = op.origin.simple().to_string();
    let origin = &origin[..8];
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            format!("{}@{}-{}.{}", stem, op.timestamp, origin, ext)
        }
        _ => format!("{}@{}-{}", name, op.timestamp, origin),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn op(timestamp: u64, origin: Uuid) -> OpId {
        OpId { timestamp, origin }
    }

    #[test]
    fn test_concurrent_distinct_names_union() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut left = Directory::new();
        let mut right = Directory::new();
        for i in 0..50 {
            left.insert(format!("a{}", i), op(i + 1, a), ObjectId::generate(), ObjectKind::File);
            right.insert(format!("b{}", i), op(i + 1, b), ObjectId::generate(), ObjectKind::File);
        }
        let mut merged = left.clone();
        assert!(merged.merge(&right));
        let mut other_way = right.clone();
        other_way.merge(&left);
        assert_eq!(merged, other_way);
        assert_eq!(merged.len(), 100);
        // idempotent
        assert!(!merged.merge(&right));
    }

    #[test]
    fn test_tombstone_wins() {
        let a = Uuid::new_v4();
        let mut dir = Directory::new();
        dir.insert("x", op(1, a), ObjectId::generate(), ObjectKind::File);
        let snapshot = dir.clone();
        assert!(dir.remove("x").is_some());
        assert!(!dir.contains("x"));

        let mut stale = snapshot.clone();
        stale.merge(&dir);
        assert!(!stale.contains("x"));
        dir.merge(&snapshot);
        assert!(!dir.contains("x"));
        assert_eq!(dir.history_len(), 1);
    }

    #[test]
    fn test_collision_is_deterministic() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let first = ObjectId::generate();
        let second = ObjectId::generate();

        let mut left = Directory::new();
        left.insert("report.txt", op(3, b), second, ObjectKind::File);
        let mut right = Directory::new();
        right.insert("report.txt", op(3, a), first, ObjectKind::File);
        left.merge(&right);
        right.merge(&left);
        assert_eq!(left.list(), right.list());

        let listing = left.list();
        assert_eq!(listing.len(), 2);
        assert_eq!(left.lookup("report.txt").unwrap().child, first);
        let loser = conflict_name("report.txt", &op(3, b));
        assert!(loser.starts_with("report@3-"));
        assert!(loser.ends_with(".txt"));
        assert_eq!(left.lookup(&loser).unwrap().child, second);

        // the renamed claim can be removed on its own
        left.remove(&loser).unwrap();
        assert_eq!(left.list().len(), 1);
        assert_eq!(left.lookup("report.txt").unwrap().child, first);
    }

    #[test]
    fn test_changes_since() {
        let a = Uuid::new_v4();
        let mut dir = Directory::new();
        dir.insert("keep", op(1, a), ObjectId::generate(), ObjectKind::File);
        dir.insert("drop", op(2, a), ObjectId::generate(), ObjectKind::File);
        let before = dir.clone();

        dir.insert("new", op(3, a), ObjectId::generate(), ObjectKind::File);
        dir.remove("drop");
        let delta = dir.changes_since(&before);
        assert_eq!(delta.history_len(), 2);

        let mut replica = before.clone();
        replica.merge(&delta);
        assert_eq!(replica, dir);
    }

    #[test]
    fn test_next_op_advances_clock() {
        let a = Uuid::new_v4();
        let mut dir = Directory::new();
        let first = dir.next_op(a);
        dir.insert("x", first, ObjectId::generate(), ObjectKind::Directory);
        let second = dir.next_op(a);
        assert!(second > first);
    }

    #[test]
    fn test_tombstones_are_kept() {
        let a = Uuid::new_v4();
        let mut dir = Directory::new();
        let mut first = None;
        for _ in 0..3 {
            let op = dir.next_op(a);
            dir.insert("cycle", op, ObjectId::generate(), ObjectKind::File);
            first.get_or_insert_with(|| dir.clone());
            assert!(dir.remove("cycle").is_some());
        }
        let last = dir.next_op(a);
        let live = ObjectId::generate();
        dir.insert("cycle", last, live, ObjectKind::File);

        assert_eq!(dir.len(), 1);
        assert_eq!(dir.history_len(), 4);
        // a replica that only saw the first create cannot bring it back
        let stale = first.unwrap();
        assert!(!dir.merge(&stale));
        assert_eq!(dir.lookup("cycle").unwrap().child, live);
    }
}
