//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed caller input (400)
    Validation(&'static str),
    /// Provider failure (500), with a summary and the underlying detail
    Upstream {
        error: &'static str,
        details: String,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(error) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error,
                    details: None,
                }),
            )
                .into_response(),
            Self::Upstream { error, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error,
                    details: Some(&details),
                }),
            )
                .into_response(),
        }
    }
}
