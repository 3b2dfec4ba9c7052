//! Replica API served by storage nodes
//!
//! Coordinators in mounts and repair tools drive replicas through these
//! routes via [`crate::http_server::api::client::HttpNodeClient`].

use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

pub mod peers;
pub mod replica;

pub use peers::{
    AnnounceRequest, ForgetRequest, ForgetResponse, InfoRequest, PeersRequest, PeersResponse,
    PingRequest,
};
pub use replica::{
    FetchRequest, ListRequest, LockRequest, OwnershipRequest, RemoveRequest, StoreRequest,
    UnlockRequest,
};

use crate::NodeState;

/// Empty success body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}

pub fn router(state: NodeState) -> Router {
    Router::new()
        .route("/info", get(peers::info_handler))
        .route("/ping", get(peers::ping_handler))
        .route("/peers", get(peers::peers_handler))
        .route("/announce", post(peers::announce_handler))
        .route("/forget", post(peers::forget_handler))
        .route("/fetch", post(replica::fetch_handler))
        .route("/lock", post(replica::lock_handler))
        .route("/unlock", post(replica::unlock_handler))
        .route("/store", post(replica::store_handler))
        .route("/ownership", post(replica::ownership_handler))
        .route("/remove", post(replica::remove_handler))
        .route("/list", get(replica::list_handler))
        .with_state(state)
}
