use std::time::Duration;

use axum::http::{StatusCode, header};
use axum_core::response::{IntoResponse as AxumCoreIntoResponse, Response};
use eyre::Report;

use crate::digest::ReadBodyError;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error(transparent)]
    Unexpected(#[from] Report),
    #[error("Invalid signing request: {0}")]
    BadRequest(String),
    #[error("key not found")]
    UnknownKey(String),
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(u64),
    #[error("signing engine timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("signing failed: {0}")]
    Engine(String),
}

impl From<ReadBodyError> for SigningError {
    fn from(error: ReadBodyError) -> Self {
        match error {
            ReadBodyError::TooLarge(limit) => Self::PayloadTooLarge(limit),
            ReadBodyError::Io(err) => Self::BadRequest(format!("reading request body: {err}")),
        }
    }
}

/// Trait implementation to convert this error into an axum http response
impl AxumCoreIntoResponse for SigningError {
    fn into_response(self) -> Response {
        let status = match &self {
            SigningError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SigningError::UnknownKey(_) => StatusCode::NOT_FOUND,
            SigningError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            SigningError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SigningError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SigningError::Unexpected(_) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    "Something wrong happened.",
                )
                    .into_response();
            }
        };
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
