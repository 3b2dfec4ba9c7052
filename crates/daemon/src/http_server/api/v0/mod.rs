use axum::Router;

pub mod ctl;
pub mod fs;
pub mod node;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router {
    match state {
        ServiceState::Node(node) => Router::new().nest("/node", node::router(node)),
        ServiceState::Mount(mount) => Router::new()
            .nest("/fs", fs::router(mount.clone()))
            .nest("/ctl", ctl::router(mount)),
    }
}
