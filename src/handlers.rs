use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::AppError;
use crate::intake::{parse_body, Intake};
use crate::models::SubmissionResponse;
use crate::rate_limit::RateLimiter;
use crate::schemas::{CompleteSubmission, FormSubmission, PartialSubmission};

/// Shared application state.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Per-IP submission throttle.
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Validation, verification and delivery pipeline.
    pub intake: Intake,
}

type ClientAddr = Option<ConnectInfo<SocketAddr>>;

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /submit-partial
///
/// First funnel step: address, phone and consent.
pub async fn submit_partial(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    addr: ClientAddr,
    body: Bytes,
) -> Response {
    let result = handle_partial(&state, &headers, addr, &body).await;
    respond(&state, result)
}

/// POST /submit-lead
///
/// Single-step complete submission with `fullName`.
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    addr: ClientAddr,
    body: Bytes,
) -> Response {
    let result = handle_lead(&state, &headers, addr, &body).await;
    respond(&state, result)
}

/// POST /submit-form
///
/// Multi-step form, optionally carrying the `leadId` of an earlier partial.
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    addr: ClientAddr,
    body: Bytes,
) -> Response {
    let result = handle_form(&state, &headers, addr, &body).await;
    respond(&state, result)
}

/// Any non-POST method on a submission endpoint.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// CORS preflight for clients that send OPTIONS without preflight headers.
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

async fn handle_partial(
    state: &AppState,
    headers: &HeaderMap,
    addr: ClientAddr,
    body: &[u8],
) -> Result<SubmissionResponse, AppError> {
    throttle(state, headers, addr).await?;
    let submission: PartialSubmission = parse_body(body)?;
    state.intake.process_partial(submission).await
}

async fn handle_lead(
    state: &AppState,
    headers: &HeaderMap,
    addr: ClientAddr,
    body: &[u8],
) -> Result<SubmissionResponse, AppError> {
    throttle(state, headers, addr).await?;
    let submission: CompleteSubmission = parse_body(body)?;
    state.intake.process_lead(submission).await
}

async fn handle_form(
    state: &AppState,
    headers: &HeaderMap,
    addr: ClientAddr,
    body: &[u8],
) -> Result<SubmissionResponse, AppError> {
    throttle(state, headers, addr).await?;
    let submission: FormSubmission = parse_body(body)?;
    state.intake.process_form(submission).await
}

async fn throttle(state: &AppState, headers: &HeaderMap, addr: ClientAddr) -> Result<(), AppError> {
    let ip = client_ip(
        headers,
        addr.map(|ConnectInfo(a)| a),
        state.config.trust_proxy_headers,
    );
    let decision = state.rate_limiter.check(&ip).await;
    if decision.success {
        Ok(())
    } else {
        tracing::warn!("Rate limit exceeded for {}", ip);
        Err(AppError::RateLimited {
            retry_after: decision.retry_after.unwrap_or(1),
        })
    }
}

fn respond(state: &AppState, result: Result<SubmissionResponse, AppError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => e.into_response_with(state.config.expose_error_details()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller address. With `trust_proxy` set: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer. Otherwise the socket peer only.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
        if let Some(real_ip) = header_str(headers, "x-real-ip") {
            return real_ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
