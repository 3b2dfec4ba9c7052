use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::object::TruncateOutcome;

use super::b64;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::error::HandlerError;
use crate::MountState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub path: String,
    pub offset: u64,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub written: usize,
}

pub async fn write_handler(
    State(state): State<MountState>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<WriteResponse>, HandlerError> {
    let written = state
        .gateway()
        .write(&req.path, req.offset, &req.data)
        .await?;
    Ok(Json(WriteResponse { written }))
}

impl ApiRequest for WriteRequest {
    type Response = WriteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/write")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub path: String,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    /// File length after the append
    pub len: u64,
}

pub async fn append_handler(
    State(state): State<MountState>,
    Json(req): Json<AppendRequest>,
) -> Result<Json<AppendResponse>, HandlerError> {
    let len = state.gateway().append(&req.path, &req.data).await?;
    Ok(Json(AppendResponse { len }))
}

impl ApiRequest for AppendRequest {
    type Response = AppendResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/append")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct ReadRequest {
    /// File to read
    pub path: String,

    /// Byte offset to start at
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub offset: u64,

    /// Bytes to read (the whole remainder if not set)
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

pub async fn read_handler(
    State(state): State<MountState>,
    Json(req): Json<ReadRequest>,
) -> Result<Json<ReadResponse>, HandlerError> {
    let gateway = state.gateway();
    let data = match req.len {
        Some(len) => gateway.read(&req.path, req.offset, len).await?,
        None => {
            let all = gateway.read_all(&req.path).await?;
            usize::try_from(req.offset)
                .ok()
                .and_then(|offset| all.get(offset..))
                .map(<[u8]>::to_vec)
                .unwrap_or_default()
        }
    };
    Ok(Json(ReadResponse { data }))
}

impl ApiRequest for ReadRequest {
    type Response = ReadResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/read")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct TruncateRequest {
    /// File to resize
    pub path: String,
    /// New length in bytes
    pub len: u64,
}

pub async fn truncate_handler(
    State(state): State<MountState>,
    Json(req): Json<TruncateRequest>,
) -> Result<Json<TruncateOutcome>, HandlerError> {
    let outcome = state.gateway().truncate(&req.path, req.len).await?;
    Ok(Json(outcome))
}

impl ApiRequest for TruncateRequest {
    type Response = TruncateOutcome;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/truncate")?;
        Ok(client.post(full_url).json(&self))
    }
}
