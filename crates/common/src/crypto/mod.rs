//! Cryptographic primitives
//!
//! - **Identity**: Ed25519 keypairs identify storage nodes and mount identities
//! - **Sealing**: ChaCha20-Poly1305 keys derived from a passphrase protect
//!   mount identity keys on disk

mod keys;
mod secret;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{Secret, SecretError};
