//! Path operations of a mount
//!
//! Every route acts as the identity the mount daemon was started with.
//! File contents travel base64 encoded inside the JSON bodies.

use axum::routing::post;
use axum::Router;

pub mod create;
pub mod data;
pub mod tree;

pub use create::{CreateRequest, CreateResponse, MkdirRequest};
pub use data::{
    AppendRequest, AppendResponse, ReadRequest, ReadResponse, TruncateRequest, WriteRequest,
    WriteResponse,
};
pub use tree::{DeleteRequest, DeleteResponse, ReaddirRequest, ReaddirResponse, StatRequest};

use crate::MountState;

pub fn router(state: MountState) -> Router {
    Router::new()
        .route("/create", post(create::create_handler))
        .route("/mkdir", post(create::mkdir_handler))
        .route("/write", post(data::write_handler))
        .route("/append", post(data::append_handler))
        .route("/read", post(data::read_handler))
        .route("/truncate", post(data::truncate_handler))
        .route("/delete", post(tree::delete_handler))
        .route("/readdir", post(tree::readdir_handler))
        .route("/stat", post(tree::stat_handler))
        .with_state(state)
}

/// Serde adapter carrying bytes as standard base64 text
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
