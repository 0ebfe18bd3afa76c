//! REST API for the config flow engine
//!
//! Exposes the config manager views over HTTP using axum. This crate is the
//! only layer that knows about status codes; the flow engine reports typed
//! errors and [`ApiError`] maps them.

pub mod config_manager;
pub mod error;
pub mod validation;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use ha_config_flow::FlowManager;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config_manager::FlowResponse;
pub use error::ApiError;
pub use validation::{validate_body, FlowRequest, ValidationError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub flow_manager: Arc<FlowManager>,
}

impl AppState {
    pub fn new(flow_manager: Arc<FlowManager>) -> Self {
        Self { flow_manager }
    }
}

/// API status response
#[derive(Serialize)]
pub struct ApiStatus {
    pub message: &'static str,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/", get(api_status))
        .route("/api/health", get(health_check))
        .route(
            "/api/config/config_manager/flow",
            get(config_manager::list_flows).post(config_manager::create_flow),
        )
        .route(
            "/api/config/config_manager/flow/:flow_id",
            post(config_manager::progress_flow).delete(config_manager::abort_flow),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: AppState, addr: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router).await
}

/// GET /api/ - Returns API status
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
    })
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
