use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::handlers::{self, AppState};

/// Builds the application router with its middleware stack.
pub fn build_router(state: Arc<AppState>) -> Router {
    let expose_details = state.config.expose_error_details();
    let max_body_bytes = state.config.max_body_bytes;

    let submissions = Router::new()
        .route(
            "/submit-partial",
            post(handlers::submit_partial)
                .get(handlers::method_not_allowed)
                .options(handlers::preflight),
        )
        .route(
            "/submit-lead",
            post(handlers::submit_lead)
                .get(handlers::method_not_allowed)
                .options(handlers::preflight),
        )
        .route(
            "/submit-form",
            post(handlers::submit_form)
                .get(handlers::method_not_allowed)
                .options(handlers::preflight),
        )
        // Request size limit (prevents memory exhaustion)
        .layer(RequestBodyLimitLayer::new(max_body_bytes));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(submissions)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(move |panic| {
                    panic_response(panic, expose_details)
                }))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_details: bool) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Request handler panicked: {}", detail);

    let body = if expose_details {
        json!({ "error": "Internal server error", "details": detail })
    } else {
        json!({ "error": "Internal server error" })
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CACHE_CONTROL, "no-store")],
        Json(body),
    )
        .into_response()
}
