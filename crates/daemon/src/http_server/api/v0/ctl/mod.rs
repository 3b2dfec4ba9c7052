//! Administrative get/set channel of a mount

use axum::routing::post;
use axum::Router;

pub mod get;
pub mod set;

pub use get::{GetRequest, GetResponse};
pub use set::{SetRequest, SetResponse};

use crate::MountState;

pub fn router(state: MountState) -> Router {
    Router::new()
        .route("/get", post(get::handler))
        .route("/set", post(set::handler))
        .with_state(state)
}
