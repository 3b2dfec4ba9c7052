use axum::Router;

pub mod client;
pub mod error;
pub mod v0;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router {
    Router::new().nest("/v0", v0::router(state))
}
