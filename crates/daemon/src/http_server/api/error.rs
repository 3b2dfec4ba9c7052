use axum::response::{IntoResponse, Response};
use axum::Json;
use common::error::{ErrorKind, StoreError};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// JSON body of every failed API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub msg: String,
}

/// Store errors surfaced by API handlers
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct HandlerError(#[from] pub StoreError);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            kind,
            msg: message(self.0),
        };
        (status, Json(body)).into_response()
    }
}

/// The error text without its category prefix, which the kind carries
fn message(err: StoreError) -> String {
    match err {
        StoreError::PermissionDenied(msg)
        | StoreError::Unavailable(msg)
        | StoreError::NotFound(msg)
        | StoreError::InvalidArgument(msg)
        | StoreError::Conflict(msg)
        | StoreError::Internal(msg) => msg,
        other => other.to_string(),
    }
}
