//! Per-object access control
//!
//! A [`CapabilityRecord`] names an owner plus reader, writer and admin sets.
//! The owner implicitly holds every relation, so the admin set is never
//! effectively empty. Inheritance is a one-shot snapshot taken when a child
//! is created; later changes to the parent never reach existing children.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::StoreError;
use crate::identity::KeySignature;

/// Capability subjects are identity public keys
pub type Subject = PublicKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    Admin,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Write => write!(f, "write"),
            Action::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Reader,
    Writer,
    Admin,
}

/// Which relations a directory copies into children created under it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InheritMode {
    #[default]
    None,
    Read,
    ReadWrite,
}

impl FromStr for InheritMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(InheritMode::None),
            "r" | "read" => Ok(InheritMode::Read),
            "rw" | "readwrite" | "read-write" => Ok(InheritMode::ReadWrite),
            other => Err(StoreError::invalid(format!(
                "unknown inherit mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for InheritMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InheritMode::None => write!(f, "none"),
            InheritMode::Read => write!(f, "read"),
            InheritMode::ReadWrite => write!(f, "rw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    owner: Subject,
    readers: BTreeSet<Subject>,
    writers: BTreeSet<Subject>,
    admins: BTreeSet<Subject>,
    aliases: BTreeMap<String, Subject>,
    inherit: InheritMode,
}

impl CapabilityRecord {
    pub fn new(owner: Subject) -> Self {
        Self {
            owner,
            readers: BTreeSet::new(),
            writers: BTreeSet::new(),
            admins: BTreeSet::new(),
            aliases: BTreeMap::new(),
            inherit: InheritMode::None,
        }
    }

    pub fn owner(&self) -> &Subject {
        &self.owner
    }

    pub fn readers(&self) -> &BTreeSet<Subject> {
        &self.readers
    }

    pub fn writers(&self) -> &BTreeSet<Subject> {
        &self.writers
    }

    pub fn admins(&self) -> &BTreeSet<Subject> {
        &self.admins
    }

    pub fn aliases(&self) -> &BTreeMap<String, Subject> {
        &self.aliases
    }

    pub fn inherit(&self) -> InheritMode {
        self.inherit
    }

    pub fn allows(&self, identity: &Subject, action: Action) -> bool {
        if *identity == self.owner || self.admins.contains(identity) {
            return true;
        }
        match action {
            Action::Read => self.readers.contains(identity) || self.writers.contains(identity),
            Action::Write => self.writers.contains(identity),
            Action::Admin => false,
        }
    }

    /// Allow if any of the caller's identities (own key plus held group
    /// keys) is allowed
    pub fn authorize(&self, identities: &[Subject], action: Action) -> Result<(), StoreError> {
        if identities.iter().any(|id| self.allows(id, action)) {
            Ok(())
        } else {
            Err(StoreError::permission(format!("{} access denied", action)))
        }
    }

    /// Add `subject` to `relation`. Returns whether the record changed.
    pub fn grant(
        &mut self,
        caller: &[Subject],
        relation: Relation,
        subject: Subject,
    ) -> Result<bool, StoreError> {
        self.authorize(caller, Action::Admin)?;
        Ok(self.relation_mut(relation).insert(subject))
    }

    /// Remove `subject` from `relation`. Returns whether the record changed.
    pub fn revoke(
        &mut self,
        caller: &[Subject],
        relation: Relation,
        subject: Subject,
    ) -> Result<bool, StoreError> {
        self.authorize(caller, Action::Admin)?;
        if relation == Relation::Admin && subject == self.owner {
            return Err(StoreError::invalid("the owner cannot be removed as admin"));
        }
        Ok(self.relation_mut(relation).remove(&subject))
    }

    pub fn set_inherit(&mut self, caller: &[Subject], mode: InheritMode) -> Result<bool, StoreError> {
        self.authorize(caller, Action::Admin)?;
        let changed = self.inherit != mode;
        self.inherit = mode;
        Ok(changed)
    }

    pub fn add_alias(
        &mut self,
        caller: &[Subject],
        name: &str,
        subject: Subject,
    ) -> Result<bool, StoreError> {
        self.authorize(caller, Action::Admin)?;
        validate_alias_name(name)?;
        Ok(self.aliases.insert(name.to_string(), subject) != Some(subject))
    }

    pub fn remove_alias(&mut self, caller: &[Subject], name: &str) -> Result<bool, StoreError> {
        self.authorize(caller, Action::Admin)?;
        Ok(self.aliases.remove(name).is_some())
    }

    /// Capability record for a new child created by `child_owner` under
    /// this directory
    ///
    /// Copies readers (mode read) or readers and writers (mode rw), with
    /// this record's owner counted in each copied set, and carries the mode
    /// down so nested creation keeps propagating. Admins and aliases stay
    /// behind.
    pub fn inherit_for_child(&self, child_owner: Subject) -> CapabilityRecord {
        let mut child = CapabilityRecord::new(child_owner);
        child.inherit = self.inherit;
        match self.inherit {
            InheritMode::None => {}
            InheritMode::Read => {
                child.readers = self.readers.clone();
                child.readers.insert(self.owner);
            }
            InheritMode::ReadWrite => {
                child.readers = self.readers.clone();
                child.readers.insert(self.owner);
                child.writers = self.writers.clone();
                child.writers.insert(self.owner);
            }
        }
        child.readers.remove(&child_owner);
        child.writers.remove(&child_owner);
        child
    }

    fn relation_mut(&mut self, relation: Relation) -> &mut BTreeSet<Subject> {
        match relation {
            Relation::Reader => &mut self.readers,
            Relation::Writer => &mut self.writers,
            Relation::Admin => &mut self.admins,
        }
    }
}

fn validate_alias_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains(|c: char| c == ':' || c.is_whitespace()) {
        return Err(StoreError::invalid(format!("invalid alias name: {:?}", name)));
    }
    Ok(())
}

/// Mount-local alias namespace
///
/// Lives with the mount identity rather than in any object, so adding an
/// alias on the mount root leaves the root's own metadata untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasBook {
    #[serde(default)]
    aliases: BTreeMap<String, Subject>,
}

impl AliasBook {
    pub fn insert(&mut self, name: &str, subject: Subject) -> Result<bool, StoreError> {
        validate_alias_name(name)?;
        Ok(self.aliases.insert(name.to_string(), subject) != Some(subject))
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.aliases.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Subject> {
        self.aliases.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Subject)> {
        self.aliases.iter()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Turn an administrative value into a subject
///
/// Looks at the object's own aliases first, then the mount namespace, then
/// accepts a verified key signature or a bare public key in hex.
pub fn resolve_alias(
    value: &str,
    record: Option<&CapabilityRecord>,
    book: &AliasBook,
) -> Result<Subject, StoreError> {
    let value = value.trim();
    if let Some(subject) = record.and_then(|r| r.aliases.get(value)) {
        return Ok(*subject);
    }
    if let Some(subject) = book.get(value) {
        return Ok(*subject);
    }
    if value.contains('.') {
        return Ok(KeySignature::parse(value)?.public());
    }
    PublicKey::from_hex(value)
        .map_err(|_| StoreError::invalid(format!("unknown alias or identity: {}", value)))
}

/// Split an `addalias` value of the form `name:identity`
pub fn parse_alias_value(value: &str) -> Result<(&str, &str), StoreError> {
    value
        .trim()
        .split_once(':')
        .filter(|(name, id)| !name.is_empty() && !id.is_empty())
        .ok_or_else(|| StoreError::invalid("alias must be given as name:identity"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    fn subject() -> Subject {
        SecretKey::generate().public()
    }

    #[test]
    fn test_owner_holds_everything() {
        let alice = subject();
        let record = CapabilityRecord::new(alice);
        assert!(record.allows(&alice, Action::Read));
        assert!(record.allows(&alice, Action::Write));
        assert!(record.allows(&alice, Action::Admin));
        assert!(!record.allows(&subject(), Action::Read));
    }

    #[test]
    fn test_reader_cannot_write() {
        let alice = subject();
        let bob = subject();
        let mut record = CapabilityRecord::new(alice);
        record.grant(&[alice], Relation::Reader, bob).unwrap();
        assert!(record.authorize(&[bob], Action::Read).is_ok());
        assert!(matches!(
            record.authorize(&[bob], Action::Write),
            Err(StoreError::PermissionDenied(_))
        ));

        record.grant(&[alice], Relation::Writer, bob).unwrap();
        assert!(record.authorize(&[bob], Action::Write).is_ok());
        // writers can read
        record.revoke(&[alice], Relation::Reader, bob).unwrap();
        assert!(record.authorize(&[bob], Action::Read).is_ok());

        record.revoke(&[alice], Relation::Writer, bob).unwrap();
        assert!(record.authorize(&[bob], Action::Read).is_err());
    }

    #[test]
    fn test_only_admins_grant() {
        let alice = subject();
        let bob = subject();
        let carol = subject();
        let mut record = CapabilityRecord::new(alice);
        assert!(matches!(
            record.grant(&[bob], Relation::Reader, carol),
            Err(StoreError::PermissionDenied(_))
        ));
        record.grant(&[alice], Relation::Admin, bob).unwrap();
        assert!(record.grant(&[bob], Relation::Reader, carol).unwrap());
        assert!(matches!(
            record.revoke(&[bob], Relation::Admin, alice),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_group_identity_authorizes() {
        let alice = subject();
        let bob = subject();
        let group = subject();
        let mut record = CapabilityRecord::new(alice);
        record.grant(&[alice], Relation::Reader, group).unwrap();
        assert!(record.authorize(&[bob], Action::Read).is_err());
        assert!(record.authorize(&[bob, group], Action::Read).is_ok());
    }

    #[test]
    fn test_inherit_snapshot() {
        let alice = subject();
        let bob = subject();
        let carol = subject();
        let mut dir = CapabilityRecord::new(alice);
        dir.grant(&[alice], Relation::Reader, bob).unwrap();
        dir.grant(&[alice], Relation::Writer, bob).unwrap();
        dir.grant(&[alice], Relation::Admin, carol).unwrap();
        dir.add_alias(&[alice], "bob", bob).unwrap();

        // no inheritance yet
        let before = dir.inherit_for_child(alice);
        assert!(before.readers().is_empty());

        dir.set_inherit(&[alice], InheritMode::ReadWrite).unwrap();
        let child = dir.inherit_for_child(bob);
        assert_eq!(child.owner(), &bob);
        assert!(child.readers().contains(&alice));
        assert!(child.writers().contains(&alice));
        assert!(!child.readers().contains(&bob));
        assert!(child.admins().is_empty());
        assert!(child.aliases().is_empty());
        assert_eq!(child.inherit(), InheritMode::ReadWrite);

        // grandchild created by alice keeps bob
        let grandchild = child.inherit_for_child(alice);
        assert!(grandchild.writers().contains(&bob));
        assert!(grandchild.allows(&bob, Action::Write));

        // snapshot, not a link
        dir.revoke(&[alice], Relation::Writer, bob).unwrap();
        assert!(child.allows(&alice, Action::Write));
    }

    #[test]
    fn test_inherit_read_only() {
        let alice = subject();
        let bob = subject();
        let mut dir = CapabilityRecord::new(alice);
        dir.grant(&[alice], Relation::Writer, bob).unwrap();
        dir.set_inherit(&[alice], InheritMode::Read).unwrap();
        let child = dir.inherit_for_child(alice);
        assert!(child.writers().is_empty());
        assert!(!child.allows(&bob, Action::Read));
    }

    #[test]
    fn test_inherit_mode_parse() {
        assert_eq!("rw".parse::<InheritMode>().unwrap(), InheritMode::ReadWrite);
        assert_eq!("Read".parse::<InheritMode>().unwrap(), InheritMode::Read);
        assert_eq!("none".parse::<InheritMode>().unwrap(), InheritMode::None);
        assert!(matches!(
            "write".parse::<InheritMode>(),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_alias_order() {
        let alice = subject();
        let bob = subject();
        let carol = subject();
        let mut record = CapabilityRecord::new(alice);
        record.add_alias(&[alice], "friend", carol).unwrap();
        let mut book = AliasBook::default();
        book.insert("friend", bob).unwrap();
        book.insert("bob", bob).unwrap();

        assert_eq!(resolve_alias("friend", Some(&record), &book).unwrap(), carol);
        assert_eq!(resolve_alias("friend", None, &book).unwrap(), bob);
        assert_eq!(resolve_alias(&alice.to_hex(), None, &book).unwrap(), alice);
        assert!(matches!(
            resolve_alias("nobody", None, &book),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_alias_value() {
        assert_eq!(parse_alias_value("bob:abcd").unwrap(), ("bob", "abcd"));
        assert!(parse_alias_value("bob").is_err());
        assert!(parse_alias_value(":abcd").is_err());
    }
}
