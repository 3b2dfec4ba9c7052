use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::ledger::NodeId;
use common::node::NodeInfo;

use super::Ack;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::service_state::PeerInfo;
use crate::NodeState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRequest;

pub async fn info_handler(State(state): State<NodeState>) -> Json<NodeInfo> {
    Json(state.node().info())
}

impl ApiRequest for InfoRequest {
    type Response = NodeInfo;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/info")?;
        Ok(client.get(full_url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest;

pub async fn ping_handler() -> Json<Ack> {
    Json(Ack {})
}

impl ApiRequest for PingRequest {
    type Response = Ack;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/ping")?;
        Ok(client.get(full_url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

pub async fn peers_handler(State(state): State<NodeState>) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: state.peers().list(),
    })
}

impl ApiRequest for PeersRequest {
    type Response = PeersResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/peers")?;
        Ok(client.get(full_url))
    }
}

/// A node telling an existing member where it can be reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceRequest {
    pub id: NodeId,
    pub url: Url,
}

pub async fn announce_handler(
    State(state): State<NodeState>,
    Json(req): Json<AnnounceRequest>,
) -> Json<PeersResponse> {
    if state.peers().insert(req.id, req.url.clone()) {
        tracing::info!(peer = %req.id.short(), url = %req.url, "peer joined");
    }
    Json(PeersResponse {
        peers: state.peers().list(),
    })
}

impl ApiRequest for AnnounceRequest {
    type Response = PeersResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/announce")?;
        Ok(client.post(full_url).json(&self))
    }
}


/// Drop an evicted node from the peer book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetRequest {
    pub id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetResponse {
    pub forgotten: bool,
}

pub async fn forget_handler(
    State(state): State<NodeState>,
    Json(req): Json<ForgetRequest>,
) -> Json<ForgetResponse> {
    let forgotten = state.peers().remove(&req.id);
    if forgotten {
        tracing::info!(peer = %req.id.short(), "peer forgotten");
    }
    Json(ForgetResponse { forgotten })
}

impl ApiRequest for ForgetRequest {
    type Response = ForgetResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/forget")?;
        Ok(client.post(full_url).json(&self))
    }
}
