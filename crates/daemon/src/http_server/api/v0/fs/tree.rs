use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::gateway::{Entry, Stat};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::error::HandlerError;
use crate::MountState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct ReaddirRequest {
    /// Directory to list (defaults to the mount root)
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaddirResponse {
    pub entries: Vec<Entry>,
}

pub async fn readdir_handler(
    State(state): State<MountState>,
    Json(req): Json<ReaddirRequest>,
) -> Result<Json<ReaddirResponse>, HandlerError> {
    let entries = state.gateway().readdir(&req.path).await?;
    Ok(Json(ReaddirResponse { entries }))
}

impl ApiRequest for ReaddirRequest {
    type Response = ReaddirResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/readdir")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct StatRequest {
    pub path: String,
}

pub async fn stat_handler(
    State(state): State<MountState>,
    Json(req): Json<StatRequest>,
) -> Result<Json<Stat>, HandlerError> {
    Ok(Json(state.gateway().stat(&req.path).await?))
}

impl ApiRequest for StatRequest {
    type Response = Stat;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/stat")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct DeleteRequest {
    /// File or directory to remove; directories go with their contents
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub path: String,
}

pub async fn delete_handler(
    State(state): State<MountState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, HandlerError> {
    state.gateway().delete(&req.path).await?;
    Ok(Json(DeleteResponse { path: req.path }))
}

impl ApiRequest for DeleteRequest {
    type Response = DeleteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/delete")?;
        Ok(client.post(full_url).json(&self))
    }
}
