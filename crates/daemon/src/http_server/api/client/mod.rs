mod client;
mod error;
mod node;

pub use client::ApiClient;
pub use error::ApiError;
pub use node::{
    cluster_replication, connect_membership, discover_peers, membership_from_peers,
    HttpDiscovery, HttpNodeClient,
};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

/// A request the API client knows how to send
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}
