use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::error::HandlerError;
use crate::MountState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct GetRequest {
    /// One of: address, owners, ownersstate, dump, info
    pub verb: String,
    /// Object to inspect
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: String,
}

pub async fn handler(
    State(state): State<MountState>,
    Json(req): Json<GetRequest>,
) -> Result<Json<GetResponse>, HandlerError> {
    let value = state.gateway().get(&req.path, &req.verb).await?;
    Ok(Json(GetResponse { value }))
}

impl ApiRequest for GetRequest {
    type Response = GetResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/ctl/get")?;
        Ok(client.post(full_url).json(&self))
    }
}
