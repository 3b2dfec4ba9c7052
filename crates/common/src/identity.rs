//! Mount identities
//!
//! An identity is an Ed25519 key bound to a human-readable alias. The
//! provider keeps one sealed key file per alias under a per-user directory
//! (`~/.beyond` by default), so a mount restarted with the same alias and
//! passphrase acts as the same subject. The shareable form of an identity
//! is its [`KeySignature`]: the public key plus a self-signature proving
//! possession of the private half.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::Signature;

use crate::capability::AliasBook;
use crate::crypto::{PublicKey, Secret, SecretKey};
use crate::error::StoreError;

pub const KEY_FILE_EXT: &str = "pem";
pub const KEYSIG_FILE_EXT: &str = "keysig";
pub const ALIASES_FILE_EXT: &str = "aliases.toml";
pub const GROUPS_DIR_NAME: &str = "groups";

const SEALED_PEM_TAG: &str = "BEYOND SEALED KEY";
const SEAL_CONTEXT: &str = "beyond mount identity seal v1";
const KEYSIG_DOMAIN: &[u8] = b"beyond-keysig:";

/// Public key plus a signature over it, shared as `<key hex>.<sig hex>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySignature {
    public: PublicKey,
    signature: Signature,
}

impl KeySignature {
    pub fn sign(secret: &SecretKey) -> Self {
        let public = secret.public();
        let signature = secret.sign(&Self::message(&public));
        Self { public, signature }
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// Parse and verify a key signature
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        let (key_hex, sig_hex) = value
            .trim()
            .split_once('.')
            .ok_or_else(|| StoreError::invalid("key signature must be <key>.<signature>"))?;
        let public = PublicKey::from_hex(key_hex)
            .map_err(|_| StoreError::invalid("malformed key in key signature"))?;
        let mut sig_bytes = [0u8; 64];
        hex::decode_to_slice(sig_hex, &mut sig_bytes)
            .map_err(|_| StoreError::invalid("malformed signature in key signature"))?;
        let signature = Signature::from_bytes(&sig_bytes);
        public
            .verify(&Self::message(&public), &signature)
            .map_err(|_| StoreError::invalid("key signature does not verify"))?;
        Ok(Self { public, signature })
    }

    fn message(public: &PublicKey) -> Vec<u8> {
        let mut msg = KEYSIG_DOMAIN.to_vec();
        msg.extend_from_slice(public.as_bytes());
        msg
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.public.to_hex(),
            hex::encode(self.signature.to_bytes())
        )
    }
}

/// The acting identity of a mount, plus any group keys it holds
#[derive(Debug, Clone)]
pub struct Identity {
    alias: String,
    secret: SecretKey,
    groups: Vec<(String, SecretKey)>,
}

impl Identity {
    /// In-memory identity that is never persisted
    pub fn ephemeral(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            secret: SecretKey::generate(),
            groups: Vec::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn public(&self) -> PublicKey {
        self.secret.public()
    }

    pub fn key_signature(&self) -> KeySignature {
        KeySignature::sign(&self.secret)
    }

    /// Every subject this identity may act as: its own key first
    pub fn subjects(&self) -> Vec<PublicKey> {
        std::iter::once(self.public())
            .chain(self.groups.iter().map(|(_, key)| key.public()))
            .collect()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, PublicKey)> {
        self.groups.iter().map(|(name, key)| (name.as_str(), key.public()))
    }

    pub fn add_group(&mut self, name: impl Into<String>, key: SecretKey) {
        let name = name.into();
        if !self.groups.iter().any(|(n, _)| *n == name) {
            self.groups.push((name, key));
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityProvider {
    dir: PathBuf,
}

impl IdentityProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", alias, KEY_FILE_EXT))
    }

    pub fn keysig_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", alias, KEYSIG_FILE_EXT))
    }

    pub fn aliases_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", alias, ALIASES_FILE_EXT))
    }

    pub fn groups_dir(&self) -> PathBuf {
        self.dir.join(GROUPS_DIR_NAME)
    }

    /// Create the identity for `alias`, or load it if it already exists
    pub fn create(&self, alias: &str, passphrase: &str) -> Result<Identity, StoreError> {
        validate_name(alias)?;
        if self.key_path(alias).exists() {
            return self.load(alias, passphrase);
        }

        fs::create_dir_all(&self.dir)?;
        let secret = SecretKey::generate();
        let sealed = seal_key(&secret, alias, passphrase)?;
        fs::write(self.key_path(alias), sealed)?;
        fs::write(
            self.keysig_path(alias),
            KeySignature::sign(&secret).to_string(),
        )?;
        tracing::info!(alias, key = %secret.public().short(), "created mount identity");

        Ok(Identity {
            alias: alias.to_string(),
            secret,
            groups: self.load_groups()?,
        })
    }

    /// Load an existing identity; a wrong passphrase is a permission error
    pub fn load(&self, alias: &str, passphrase: &str) -> Result<Identity, StoreError> {
        validate_name(alias)?;
        let path = self.key_path(alias);
        if !path.exists() {
            return Err(StoreError::not_found(format!("no identity named {}", alias)));
        }
        let pem_str = fs::read_to_string(&path)?;
        let secret = open_key(&pem_str, alias, passphrase)?;
        Ok(Identity {
            alias: alias.to_string(),
            secret,
            groups: self.load_groups()?,
        })
    }

    pub fn read_keysig(&self, alias: &str) -> Result<KeySignature, StoreError> {
        validate_name(alias)?;
        let path = self.keysig_path(alias);
        if !path.exists() {
            return Err(StoreError::not_found(format!("no key signature for {}", alias)));
        }
        KeySignature::parse(&fs::read_to_string(path)?)
    }

    /// Generate (or reuse) the group key `name` and hand it to `identity`
    pub fn create_group(
        &self,
        identity: &mut Identity,
        name: &str,
    ) -> Result<KeySignature, StoreError> {
        validate_name(name)?;
        let groups_dir = self.groups_dir();
        fs::create_dir_all(&groups_dir)?;
        let path = groups_dir.join(format!("{}.{}", name, KEY_FILE_EXT));
        let key = if path.exists() {
            SecretKey::from_pem(&fs::read_to_string(&path)?)?
        } else {
            let key = SecretKey::generate();
            fs::write(&path, key.to_pem())?;
            tracing::info!(group = name, key = %key.public().short(), "created group key");
            key
        };
        let keysig = KeySignature::sign(&key);
        identity.add_group(name, key);
        Ok(keysig)
    }

    fn load_groups(&self) -> Result<Vec<(String, SecretKey)>, StoreError> {
        let groups_dir = self.groups_dir();
        if !groups_dir.exists() {
            return Ok(Vec::new());
        }
        let mut groups = Vec::new();
        for entry in fs::read_dir(groups_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = SecretKey::from_pem(&fs::read_to_string(&path)?)?;
            groups.push((name.to_string(), key));
        }
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(groups)
    }

    pub fn load_alias_book(&self, alias: &str) -> Result<AliasBook, StoreError> {
        let path = self.aliases_path(alias);
        if !path.exists() {
            return Ok(AliasBook::default());
        }
        toml::from_str(&fs::read_to_string(path)?)
            .map_err(|e| StoreError::Internal(format!("bad alias file: {}", e)))
    }

    pub fn save_alias_book(&self, alias: &str, book: &AliasBook) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let contents = toml::to_string_pretty(book)
            .map_err(|e| StoreError::Internal(format!("alias file encode: {}", e)))?;
        fs::write(self.aliases_path(alias), contents)?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(|c: char| c == '/' || c == '\\' || c == ':' || c.is_whitespace())
    {
        return Err(StoreError::invalid(format!("invalid key name: {:?}", name)));
    }
    Ok(())
}

fn seal_secret(alias: &str, passphrase: &str) -> Secret {
    let mut material = Vec::with_capacity(alias.len() + passphrase.len() + 1);
    material.extend_from_slice(alias.as_bytes());
    material.push(0);
    material.extend_from_slice(passphrase.as_bytes());
    Secret::derive(SEAL_CONTEXT, &material)
}

fn seal_key(secret: &SecretKey, alias: &str, passphrase: &str) -> Result<String, StoreError> {
    let sealed = seal_secret(alias, passphrase).encrypt(&secret.to_bytes())?;
    Ok(pem::encode(&pem::Pem::new(SEALED_PEM_TAG, sealed)))
}

fn open_key(pem_str: &str, alias: &str, passphrase: &str) -> Result<SecretKey, StoreError> {
    let pem = pem::parse(pem_str)
        .map_err(|e| StoreError::Internal(format!("failed to parse key file: {}", e)))?;
    if pem.tag() != SEALED_PEM_TAG {
        return Err(StoreError::Internal(format!(
            "invalid PEM tag, expected {}",
            SEALED_PEM_TAG
        )));
    }
    let bytes = seal_secret(alias, passphrase)
        .decrypt(pem.contents())
        .map_err(|_| StoreError::permission(format!("wrong passphrase for {}", alias)))?;
    Ok(SecretKey::from_slice(&bytes)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_create_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let provider = IdentityProvider::new(dir.path());

        let alice = provider.create("alice", "canard").unwrap();
        assert!(provider.key_path("alice").exists());
        assert!(provider.keysig_path("alice").exists());

        let again = provider.create("alice", "canard").unwrap();
        assert_eq!(alice.public(), again.public());

        let keysig = provider.read_keysig("alice").unwrap();
        assert_eq!(keysig.public(), alice.public());
    }

    #[test]
    fn test_wrong_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let provider = IdentityProvider::new(dir.path());
        provider.create("bob", "canard").unwrap();
        assert!(matches!(
            provider.load("bob", "duck"),
            Err(StoreError::PermissionDenied(_))
        ));
        assert!(matches!(
            provider.load("carol", "canard"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_key_signature_verifies() {
        let identity = Identity::ephemeral("alice");
        let keysig = identity.key_signature().to_string();
        let parsed = KeySignature::parse(&keysig).unwrap();
        assert_eq!(parsed.public(), identity.public());

        // swap in somebody else's key
        let other = Identity::ephemeral("mallory").public().to_hex();
        let (_, sig) = keysig.split_once('.').unwrap();
        assert!(KeySignature::parse(&format!("{}.{}", other, sig)).is_err());
        assert!(KeySignature::parse("nodot").is_err());
    }

    #[test]
    fn test_groups_extend_subjects() {
        let dir = tempfile::tempdir().unwrap();
        let provider = IdentityProvider::new(dir.path());
        let mut alice = provider.create("alice", "pw").unwrap();
        assert_eq!(alice.subjects().len(), 1);

        let group = provider.create_group(&mut alice, "team").unwrap();
        assert_eq!(alice.subjects(), vec![alice.public(), group.public()]);

        // reloaded identity picks the group up from disk
        let reloaded = provider.load("alice", "pw").unwrap();
        assert!(reloaded.subjects().contains(&group.public()));
    }

    #[test]
    fn test_alias_book_persists() {
        let dir = tempfile::tempdir().unwrap();
        let provider = IdentityProvider::new(dir.path());
        let bob = Identity::ephemeral("bob");
        let mut book = provider.load_alias_book("alice").unwrap();
        assert!(book.is_empty());
        book.insert("bob", bob.public()).unwrap();
        provider.save_alias_book("alice", &book).unwrap();
        let loaded = provider.load_alias_book("alice").unwrap();
        assert_eq!(loaded.get("bob"), Some(&bob.public()));
    }

    #[test]
    fn test_rejects_path_like_alias() {
        let dir = tempfile::tempdir().unwrap();
        let provider = IdentityProvider::new(dir.path());
        assert!(provider.create("../evil", "pw").is_err());
        assert!(provider.create("", "pw").is_err());
    }
}
