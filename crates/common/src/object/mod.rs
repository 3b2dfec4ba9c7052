//! Stored objects: files and directories with their metadata
//!
//! An [`ObjectRecord`] is the unit of replication. Replicas reconcile an
//! incoming record with [`ObjectRecord::absorb`]:
//! - ownership keeps whichever side has the higher epoch
//! - file content and capabilities follow the higher `version`
//! - directory entries always merge by union

mod content;
mod directory;

use serde::{Deserialize, Serialize};

pub use content::{FileContent, TruncateOutcome};
pub use directory::{conflict_name, DirEntry, Directory, Listing, OpId};

use crate::capability::CapabilityRecord;
use crate::error::StoreError;
use crate::ledger::{ObjectId, OwnershipRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    File,
    Directory,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::File => write!(f, "file"),
            ObjectKind::Directory => write!(f, "directory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectBody {
    File(FileContent),
    Directory(Directory),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub body: ObjectBody,
    pub capability: CapabilityRecord,
    pub ownership: OwnershipRecord,
    /// Total order of content and capability changes
    pub version: u64,
    /// Milliseconds since the unix epoch of the last versioned change
    pub modified: i64,
}

/// How a replica treated an incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Absorbed {
    /// Replaced (or created) the local copy
    Stored,
    /// Directory entries merged into the local copy
    Merged,
    /// Local copy already at `version` or newer; only ownership may have moved
    Outdated { version: u64 },
}

impl ObjectRecord {
    pub fn new_file(id: ObjectId, capability: CapabilityRecord, chunk_size: usize) -> Self {
        Self::new(id, ObjectBody::File(FileContent::new(chunk_size)), capability)
    }

    pub fn new_directory(id: ObjectId, capability: CapabilityRecord) -> Self {
        Self::new(id, ObjectBody::Directory(Directory::new()), capability)
    }

    fn new(id: ObjectId, body: ObjectBody, capability: CapabilityRecord) -> Self {
        Self {
            id,
            body,
            capability,
            ownership: OwnershipRecord::default(),
            version: 1,
            modified: now_millis(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self.body {
            ObjectBody::File(_) => ObjectKind::File,
            ObjectBody::Directory(_) => ObjectKind::Directory,
        }
    }

    pub fn file(&self) -> Result<&FileContent, StoreError> {
        match &self.body {
            ObjectBody::File(content) => Ok(content),
            ObjectBody::Directory(_) => Err(StoreError::invalid("is a directory")),
        }
    }

    pub fn file_mut(&mut self) -> Result<&mut FileContent, StoreError> {
        match &mut self.body {
            ObjectBody::File(content) => Ok(content),
            ObjectBody::Directory(_) => Err(StoreError::invalid("is a directory")),
        }
    }

    pub fn directory(&self) -> Result<&Directory, StoreError> {
        match &self.body {
            ObjectBody::Directory(dir) => Ok(dir),
            ObjectBody::File(_) => Err(StoreError::invalid("not a directory")),
        }
    }

    pub fn directory_mut(&mut self) -> Result<&mut Directory, StoreError> {
        match &mut self.body {
            ObjectBody::Directory(dir) => Ok(dir),
            ObjectBody::File(_) => Err(StoreError::invalid("not a directory")),
        }
    }

    /// Advance to the next version in this object's total order
    pub fn advance(&mut self) -> u64 {
        self.version += 1;
        self.modified = now_millis();
        self.version
    }

    /// Ordering used to pick the freshest replica
    pub fn freshness(&self) -> (u64, u64) {
        (self.version, self.ownership.epoch())
    }

    pub fn size(&self) -> u64 {
        match &self.body {
            ObjectBody::File(content) => content.len(),
            ObjectBody::Directory(dir) => dir.len() as u64,
        }
    }

    /// Reconcile `incoming` into this replica
    pub fn absorb(&mut self, incoming: ObjectRecord) -> Result<Absorbed, StoreError> {
        if incoming.id != self.id {
            return Err(StoreError::invalid("object id mismatch"));
        }
        if incoming.kind() != self.kind() {
            return Err(StoreError::Conflict(format!(
                "object {} is a {}, not a {}",
                self.id,
                self.kind(),
                incoming.kind()
            )));
        }
        if incoming.ownership.is_newer_than(&self.ownership) {
            self.ownership = incoming.ownership.clone();
        }

        match (&mut self.body, incoming.body) {
            (ObjectBody::Directory(ours), ObjectBody::Directory(theirs)) => {
                let merged = ours.merge(&theirs);
                let newer = incoming.version > self.version;
                if newer {
                    self.capability = incoming.capability;
                    self.version = incoming.version;
                    self.modified = incoming.modified;
                }
                Ok(if newer {
                    Absorbed::Stored
                } else if merged {
                    Absorbed::Merged
                } else {
                    Absorbed::Outdated {
                        version: self.version,
                    }
                })
            }
            (ours, theirs) => {
                if incoming.version <= self.version {
                    return Ok(Absorbed::Outdated {
                        version: self.version,
                    });
                }
                *ours = theirs;
                self.capability = incoming.capability;
                self.version = incoming.version;
                self.modified = incoming.modified;
                Ok(Absorbed::Stored)
            }
        }
    }

    /// Same record with file bytes dropped, for diagnostics
    pub fn without_content(&self) -> ObjectRecord {
        let mut copy = self.clone();
        if let ObjectBody::File(content) = &copy.body {
            copy.body = ObjectBody::File(FileContent::new(content.chunk_size()));
        }
        copy
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
