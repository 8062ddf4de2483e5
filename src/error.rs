use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

use crate::gateway::GatewayResponse;

/// Standard error response format for all API errors
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Trait for errors that can be converted to HTTP responses
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Raw failure text attached to unclassified errors
    fn details(&self) -> Option<String> {
        None
    }
}

/// Convert any HttpError into a gateway response.
///
/// `expose_details` controls whether the raw failure text of unclassified
/// errors reaches the caller.
pub fn into_response<E: HttpError>(err: &E, expose_details: bool) -> GatewayResponse {
    let status = err.status_code();
    let message = err.to_string();
    let details = err.details();

    if status.is_server_error() {
        tracing::error!(
            error = %message,
            status = %status,
            details = ?details,
            source = ?std::error::Error::source(err).map(ToString::to_string),
            "API error"
        );
    } else {
        tracing::warn!(error = %message, status = %status, "Rejected request");
    }

    let body = match details {
        Some(details) if expose_details => ErrorResponse::with_details(message, details),
        _ => ErrorResponse::new(message),
    };

    GatewayResponse::json(status, &body)
}
