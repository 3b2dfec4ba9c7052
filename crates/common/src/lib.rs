/**
 * Per-object access control: owner, readers,
 *  writers, admins, aliases and inheritance.
 */
pub mod capability;
/**
 * Cluster-wide settings, fixed when the
 *  cluster is created.
 */
pub mod config;
/**
 * Replication coordinator: quorum writes,
 *  freshest-replica reads and liveness masks.
 */
pub mod coordinator;
/**
 * Cryptographic types and operations.
 *  - Ed25519 identity and node keys
 *  - Symmetric sealing of key material
 */
pub mod crypto;
pub mod error;
/**
 * Mount gateway: path operations and the
 *  administrative get/set channel.
 */
pub mod gateway;
/**
 * Named mount identities sealed with a
 *  passphrase, plus group keys.
 */
pub mod identity;
pub mod jobs;
/**
 * Object ids, ownership records and
 *  rendezvous placement.
 */
pub mod ledger;
/**
 * Storage node: replica storage, leases
 *  and per-object serialization.
 */
pub mod node;
/**
 * Files and directories as replicated
 *  records.
 */
pub mod object;
/**
 * Evict and heal, plus the background
 *  resync worker.
 */
pub mod repair;
pub mod testkit;
pub mod transport;

pub mod prelude {
    pub use crate::capability::{CapabilityRecord, InheritMode};
    pub use crate::config::ClusterConfig;
    pub use crate::coordinator::Coordinator;
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::error::{ErrorKind, StoreError};
    pub use crate::gateway::MountGateway;
    pub use crate::identity::{Identity, IdentityProvider, KeySignature};
    pub use crate::ledger::{NodeId, ObjectId, OwnershipRecord};
    pub use crate::node::StorageNode;
    pub use crate::repair::RepairService;
    pub use crate::transport::{Membership, NodeClient};
}
