use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::ledger::ObjectId;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::error::HandlerError;
use crate::MountState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct CreateRequest {
    /// Path of the new, empty file
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: ObjectId,
}

pub async fn create_handler(
    State(state): State<MountState>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, HandlerError> {
    let id = state.gateway().create(&req.path).await?;
    Ok(Json(CreateResponse { id }))
}

impl ApiRequest for CreateRequest {
    type Response = CreateResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/create")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct MkdirRequest {
    /// Path of the new directory
    pub path: String,
}

pub async fn mkdir_handler(
    State(state): State<MountState>,
    Json(req): Json<MkdirRequest>,
) -> Result<Json<CreateResponse>, HandlerError> {
    let id = state.gateway().mkdir(&req.path).await?;
    Ok(Json(CreateResponse { id }))
}

impl ApiRequest for MkdirRequest {
    type Response = CreateResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/mkdir")?;
        Ok(client.post(full_url).json(&self))
    }
}
