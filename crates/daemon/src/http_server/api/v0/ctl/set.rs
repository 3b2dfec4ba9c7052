use axum::extract::{Json, State};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::error::HandlerError;
use crate::MountState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct SetRequest {
    /// add/remove reader|writer|admin, addalias, removealias, inherit, creategroup
    pub verb: String,
    /// Alias, key signature, public key hex or inherit mode, depending on the verb
    pub value: String,
    /// Object to change; the mount root for alias and group verbs
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponse {
    pub path: String,
    pub verb: String,
}

pub async fn handler(
    State(state): State<MountState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>, HandlerError> {
    state
        .gateway()
        .set(&req.path, &req.verb, &req.value)
        .await?;
    Ok(Json(SetResponse {
        path: req.path,
        verb: req.verb,
    }))
}

impl ApiRequest for SetRequest {
    type Response = SetResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/ctl/set")?;
        Ok(client.post(full_url).json(&self))
    }
}
