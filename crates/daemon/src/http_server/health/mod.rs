use axum::routing::get;
use axum::Router;

mod data_source;
mod liveness;
mod readiness;
mod version;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .route("/version", get(version::handler))
        .with_state(state)
}
