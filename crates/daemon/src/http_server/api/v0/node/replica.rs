use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::ledger::{ObjectId, OwnershipRecord};
use common::node::LockReply;
use common::object::{Absorbed, ObjectRecord};

use super::Ack;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::error::HandlerError;
use crate::NodeState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub record: Option<ObjectRecord>,
}

pub async fn fetch_handler(
    State(state): State<NodeState>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchResponse>, HandlerError> {
    let record = state.node().fetch(&req.id).await?;
    Ok(Json(FetchResponse { record }))
}

impl ApiRequest for FetchRequest {
    type Response = FetchResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/fetch")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub id: ObjectId,
    pub token: u64,
    pub base_version: u64,
}

pub async fn lock_handler(
    State(state): State<NodeState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockReply>, HandlerError> {
    let reply = state
        .node()
        .lock(&req.id, req.token, req.base_version)
        .await?;
    Ok(Json(reply))
}

impl ApiRequest for LockRequest {
    type Response = LockReply;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/lock")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub id: ObjectId,
    pub token: u64,
}

pub async fn unlock_handler(
    State(state): State<NodeState>,
    Json(req): Json<UnlockRequest>,
) -> Json<Ack> {
    state.node().unlock(&req.id, req.token).await;
    Json(Ack {})
}

impl ApiRequest for UnlockRequest {
    type Response = Ack;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/unlock")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub record: ObjectRecord,
    /// Lease token the write was prepared under, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<u64>,
}

pub async fn store_handler(
    State(state): State<NodeState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<Absorbed>, HandlerError> {
    let absorbed = state.node().store(req.record, req.token).await?;
    Ok(Json(absorbed))
}

impl ApiRequest for StoreRequest {
    type Response = Absorbed;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/store")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipRequest {
    pub id: ObjectId,
    pub ownership: OwnershipRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipResponse {
    /// False when the replica already held a newer epoch
    pub applied: bool,
}

pub async fn ownership_handler(
    State(state): State<NodeState>,
    Json(req): Json<OwnershipRequest>,
) -> Result<Json<OwnershipResponse>, HandlerError> {
    let applied = state.node().set_ownership(&req.id, req.ownership).await?;
    Ok(Json(OwnershipResponse { applied }))
}

impl ApiRequest for OwnershipRequest {
    type Response = OwnershipResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/ownership")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub removed: bool,
}

pub async fn remove_handler(
    State(state): State<NodeState>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<RemoveResponse>, HandlerError> {
    let removed = state.node().remove(&req.id).await?;
    Ok(Json(RemoveResponse { removed }))
}

impl ApiRequest for RemoveRequest {
    type Response = RemoveResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/remove")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub ids: Vec<ObjectId>,
}

pub async fn list_handler(
    State(state): State<NodeState>,
) -> Result<Json<ListResponse>, HandlerError> {
    let ids = state.node().list().await?;
    Ok(Json(ListResponse { ids }))
}

impl ApiRequest for ListRequest {
    type Response = ListResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/node/list")?;
        Ok(client.get(full_url))
    }
}
