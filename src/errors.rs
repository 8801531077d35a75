use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::schemas::ValidationErrors;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Request could not be understood (malformed JSON, wrong content).
    BadRequest(String),
    /// One or more fields failed schema validation.
    Validation(ValidationErrors),
    /// Caller exceeded the per-IP submission quota.
    RateLimited {
        /// Seconds until the caller may retry.
        retry_after: u64,
    },
    /// Endpoint only accepts POST.
    MethodNotAllowed,
    /// No destination accepted the lead.
    DeliveryFailed {
        /// Destination names with status classes only.
        summary: String,
        /// Full per-destination errors, including remote response text.
        details: String,
    },
    /// Error interacting with an external API.
    ExternalApiError(String),
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Validation(errors) => write!(f, "Validation failed: {}", errors),
            AppError::RateLimited { retry_after } => {
                write!(f, "Rate limited: retry after {}s", retry_after)
            }
            AppError::MethodNotAllowed => write!(f, "Method not allowed"),
            AppError::DeliveryFailed { details, .. } => write!(f, "Delivery failed: {}", details),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Converts the error into an HTTP response.
    ///
    /// `expose_details` controls whether internal error messages reach the client;
    /// it is only enabled outside production.
    pub fn into_response_with(self, expose_details: bool) -> Response {
        match self {
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppError::Validation(errors) => {
                tracing::warn!("Validation failed: {}", errors);
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Validation failed",
                        "details": errors.into_inner(),
                    })),
                )
                    .into_response()
            }
            AppError::RateLimited { retry_after } => {
                tracing::warn!("Rate limit exceeded, retry after {}s", retry_after);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Too many requests. Please try again later.",
                        "retryAfter": retry_after,
                    })),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({ "error": "Method not allowed" })),
            )
                .into_response(),
            AppError::DeliveryFailed { summary, details } => {
                tracing::error!("Lead delivery failed on every destination: {}", details);
                let reason = if expose_details { details } else { summary };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": format!("Failed to save lead: {}", reason) })),
                )
                    .into_response()
            }
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                let body = if expose_details {
                    json!({ "error": "Internal server error", "details": msg })
                } else {
                    json!({ "error": "Internal server error" })
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

impl IntoResponse for AppError {
    /// Production-safe rendering: internal details are never exposed.
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}
