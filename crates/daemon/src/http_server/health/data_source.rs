use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::ServiceState;

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("one or more dependencies aren't available")]
    DependencyFailure,
    #[allow(dead_code)]
    #[error("service is shutting down")]
    ShuttingDown,
}

/// Something the readiness probe can ask
#[async_trait]
pub trait ReadinessCheck: Send + Sync + 'static {
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[async_trait]
impl ReadinessCheck for ServiceState {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        match self {
            // a node that is serving can answer replica calls
            ServiceState::Node(_) => Ok(()),
            ServiceState::Mount(mount) => {
                let membership = mount.gateway().coordinator().membership();
                if membership.reachable().await.is_empty() {
                    tracing::warn!(members = membership.len(), "no storage node reachable");
                    return Err(DataSourceError::DependencyFailure);
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone)]
pub struct StateDataSource {
    check: Arc<dyn ReadinessCheck>,
}

impl StateDataSource {
    pub fn new(check: Arc<dyn ReadinessCheck>) -> Self {
        Self { check }
    }

    pub async fn is_ready(&self) -> Result<(), DataSourceError> {
        self.check.is_ready().await
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for StateDataSource {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::new(Arc::new(state.clone())))
    }
}
