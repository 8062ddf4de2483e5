use std::{any::Any, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::devices::handlers as devices_handlers;
use crate::error::ErrorResponse;
use crate::gateway::GatewayResponse;
use crate::openapi::swagger_ui;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub table: String,
}

/// Health check endpoint, also verifies the device table is reachable
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = match state.devices_service.count().await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach device table");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
            table: state.config.table_name.clone(),
        }),
    )
}

/// Handle request timeout errors
async fn handle_timeout_error(err: BoxError) -> GatewayResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        GatewayResponse::json(
            StatusCode::REQUEST_TIMEOUT,
            &ErrorResponse::new("Request timed out"),
        )
    } else {
        GatewayResponse::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorResponse::with_details("An unexpected error occurred.", err.to_string()),
        )
    }
}

/// Turn a handler panic into the unclassified-error response
fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_details: bool) -> Response {
    let details = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    tracing::error!(details = %details, "Handler panicked");

    let body = if expose_details {
        ErrorResponse::with_details("An unexpected error occurred.", details)
    } else {
        ErrorResponse::new("An unexpected error occurred.")
    };

    GatewayResponse::json(StatusCode::INTERNAL_SERVER_ERROR, &body).into_response()
}

/// Build the device API routes
fn devices_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/devices",
            get(devices_handlers::get_all_devices).post(devices_handlers::create_device),
        )
        .route(
            "/devices/{deviceId}",
            get(devices_handlers::get_device)
                .put(devices_handlers::update_device)
                .delete(devices_handlers::delete_device),
        )
}

/// Build the complete application router
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let expose_details = state.config.expose_error_details;

    Router::new()
        // Health check at root level
        .route("/", get(health))
        .route("/health", get(health))
        .merge(devices_routes())
        // Swagger UI for API documentation
        .merge(swagger_ui())
        .layer(
            ServiceBuilder::new()
                // Handle timeout errors
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(timeout),
        )
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| panic_response(panic, expose_details),
        ))
        // Browser front-ends call the API cross-origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
