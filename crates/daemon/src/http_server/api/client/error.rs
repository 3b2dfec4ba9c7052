use common::error::{ErrorKind, StoreError};
use reqwest::StatusCode;

use crate::http_server::api::error::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl ApiError {
    /// Rebuild the store error a remote handler reported
    ///
    /// Transport failures become `Unavailable`; error bodies carry their
    /// kind, and bare statuses fall back to the status mapping.
    pub fn into_store_error(self) -> StoreError {
        match self {
            ApiError::Reqwest(e) if e.is_decode() => StoreError::Internal(e.to_string()),
            ApiError::Reqwest(e) => StoreError::unavailable(e.to_string()),
            ApiError::UrlParse(e) => StoreError::invalid(e.to_string()),
            ApiError::HttpStatus(status, body) => match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => StoreError::from_kind(err.kind, err.msg),
                Err(_) => StoreError::from_kind(kind_for_status(status), body),
            },
        }
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::BAD_REQUEST => ErrorKind::InvalidArgument,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
    }
}
