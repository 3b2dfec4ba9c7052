//! Administrative side channel
//!
//! `get(path, verb)` and `set(path, verb, value)` expose the capability
//! store and the ownership ledger of a single object. Relation changes go
//! through the versioned write path so they are ordered with content
//! writes and survive directory merges.

use std::fmt;
use std::str::FromStr;

use crate::capability::{parse_alias_value, resolve_alias, Action, InheritMode, Relation};
use crate::crypto::SecretKey;
use crate::error::StoreError;
use crate::object::ObjectKind;

use super::MountGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetVerb {
    Address,
    Owners,
    OwnersState,
    Dump,
    Info,
}

impl FromStr for GetVerb {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "address" => Ok(GetVerb::Address),
            "owners" => Ok(GetVerb::Owners),
            "ownersstate" => Ok(GetVerb::OwnersState),
            "dump" => Ok(GetVerb::Dump),
            "info" => Ok(GetVerb::Info),
            other => Err(StoreError::invalid(format!("unknown get verb: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetVerb {
    Grant(Relation),
    Revoke(Relation),
    AddAlias,
    RemoveAlias,
    Inherit,
    CreateGroup,
}

impl FromStr for SetVerb {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "addreader" => Ok(SetVerb::Grant(Relation::Reader)),
            "addwriter" => Ok(SetVerb::Grant(Relation::Writer)),
            "addadmin" => Ok(SetVerb::Grant(Relation::Admin)),
            "removereader" => Ok(SetVerb::Revoke(Relation::Reader)),
            "removewriter" => Ok(SetVerb::Revoke(Relation::Writer)),
            "removeadmin" => Ok(SetVerb::Revoke(Relation::Admin)),
            "addalias" => Ok(SetVerb::AddAlias),
            "removealias" => Ok(SetVerb::RemoveAlias),
            "inherit" => Ok(SetVerb::Inherit),
            "creategroup" => Ok(SetVerb::CreateGroup),
            other => Err(StoreError::invalid(format!("unknown set verb: {}", other))),
        }
    }
}

impl fmt::Display for SetVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetVerb::Grant(Relation::Reader) => "addreader",
            SetVerb::Grant(Relation::Writer) => "addwriter",
            SetVerb::Grant(Relation::Admin) => "addadmin",
            SetVerb::Revoke(Relation::Reader) => "removereader",
            SetVerb::Revoke(Relation::Writer) => "removewriter",
            SetVerb::Revoke(Relation::Admin) => "removeadmin",
            SetVerb::AddAlias => "addalias",
            SetVerb::RemoveAlias => "removealias",
            SetVerb::Inherit => "inherit",
            SetVerb::CreateGroup => "creategroup",
        };
        write!(f, "{}", name)
    }
}

impl MountGateway {
    pub async fn get(&self, path: &str, verb: &str) -> Result<String, StoreError> {
        let verb: GetVerb = verb.parse()?;
        let record = self.resolve(path).await?;
        record.capability.authorize(&self.subjects(), Action::Read)?;

        Ok(match verb {
            GetVerb::Address => record.id.to_hex(),
            GetVerb::Owners => record.ownership.format_owners(),
            GetVerb::OwnersState => record.ownership.mask().to_string(),
            GetVerb::Dump => serde_json::to_string_pretty(&record.without_content())
                .map_err(|e| StoreError::Internal(e.to_string()))?,
            GetVerb::Info => {
                let cap = &record.capability;
                format!(
                    "kind: {}\nsize: {}\nversion: {}\nowner: {}\nreaders: {}\nwriters: {}\nadmins: {}\ninherit: {}\nowners: {}\nmask: {}\nepoch: {}",
                    record.kind(),
                    record.size(),
                    record.version,
                    cap.owner(),
                    cap.readers().len(),
                    cap.writers().len(),
                    cap.admins().len(),
                    cap.inherit(),
                    record.ownership.owners().len(),
                    record.ownership.mask(),
                    record.ownership.epoch(),
                )
            }
        })
    }

    pub async fn set(&self, path: &str, verb: &str, value: &str) -> Result<(), StoreError> {
        let verb: SetVerb = verb.parse()?;
        let record = self.resolve(path).await?;
        let subjects = self.subjects();
        let on_root = record.id.is_root();

        match verb {
            SetVerb::CreateGroup => return self.create_group(value.trim()),
            SetVerb::AddAlias if on_root => {
                let (name, identity) = parse_alias_value(value)?;
                let subject = resolve_alias(identity, None, &self.inner.aliases.read())?;
                self.inner.aliases.write().insert(name, subject)?;
                return self.save_aliases();
            }
            SetVerb::RemoveAlias if on_root => {
                if !self.inner.aliases.write().remove(value.trim()) {
                    return Err(StoreError::not_found(format!("alias {}", value.trim())));
                }
                return self.save_aliases();
            }
            _ if on_root => {
                return Err(StoreError::invalid(format!(
                    "{} is not allowed on the mount root",
                    verb
                )))
            }
            SetVerb::Inherit if record.kind() != ObjectKind::Directory => {
                return Err(StoreError::invalid("inherit applies to directories only"))
            }
            _ => {}
        }

        // a dry run on the resolved copy authorises and catches no-ops
        // before anything is written
        let change = |cap: &mut crate::capability::CapabilityRecord| -> Result<bool, StoreError> {
            match verb {
                SetVerb::Grant(relation) => {
                    let subject = resolve_alias(value, Some(cap), &self.inner.aliases.read())?;
                    cap.grant(&subjects, relation, subject)
                }
                SetVerb::Revoke(relation) => {
                    let subject = resolve_alias(value, Some(cap), &self.inner.aliases.read())?;
                    cap.revoke(&subjects, relation, subject)
                }
                SetVerb::Inherit => cap.set_inherit(&subjects, value.parse::<InheritMode>()?),
                SetVerb::AddAlias => {
                    let (name, identity) = parse_alias_value(value)?;
                    let subject = resolve_alias(identity, Some(cap), &self.inner.aliases.read())?;
                    cap.add_alias(&subjects, name, subject)
                }
                SetVerb::RemoveAlias => cap.remove_alias(&subjects, value.trim()),
                SetVerb::CreateGroup => Ok(false),
            }
        };

        let mut trial = record.capability.clone();
        if !change(&mut trial)? {
            return Ok(());
        }
        self.inner
            .coordinator
            .update(&record.id, |current| change(&mut current.capability))
            .await?;
        tracing::info!(path, %verb, value, "capability changed");
        Ok(())
    }

    fn create_group(&self, name: &str) -> Result<(), StoreError> {
        let keysig = {
            let mut identity = self.inner.identity.write();
            match &self.inner.provider {
                Some(provider) => provider.create_group(&mut identity, name)?,
                None => {
                    let key = SecretKey::generate();
                    let keysig = crate::identity::KeySignature::sign(&key);
                    identity.add_group(name, key);
                    keysig
                }
            }
        };
        self.inner.aliases.write().insert(name, keysig.public())?;
        self.save_aliases()?;
        tracing::info!(group = name, key = %keysig.public().short(), "created group");
        Ok(())
    }

    fn save_aliases(&self) -> Result<(), StoreError> {
        let Some(provider) = &self.inner.provider else {
            return Ok(());
        };
        let alias = self.alias();
        let book = self.inner.aliases.read().clone();
        provider.save_alias_book(&alias, &book)
    }
}
