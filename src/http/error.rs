//! Error type for HTTP handlers and its mapping onto status codes.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{ledger::LedgerError, store::StoreError};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{error}: {detail}")]
    BadRequest { error: &'static str, detail: String },
    #[error("server_error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_payload(detail: impl Into<String>) -> Self {
        ApiError::BadRequest { error: "Invalid payload", detail: detail.into() }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match &self {
            ApiError::BadRequest { error, detail } => (StatusCode::BAD_REQUEST, *error, detail.as_str()),
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", detail.as_str())
            }
        };
        (status, Json(ErrorBody { error, detail })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidInput(detail) => ApiError::invalid_payload(detail),
            LedgerError::Persistence(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_payload(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest { error: "Invalid query", detail: rejection.body_text() }
    }
}
