pub mod conversions;
pub mod dialect;
pub mod models;
pub mod openapi;
pub mod routes;

use crate::{
    openapi::ApiDoc,
    routes::{chat_completions, create_message, health_check, list_responses, reload_responses},
};
use axum::{
    routing::{get, post},
    Router,
};
use config::DialectsConfig;
use services::{ReloadTrigger, Resolver, SnapshotHandle, StreamEncoder, TokenizerRegistry};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// Shared state of every route
#[derive(Clone)]
pub struct AppState {
    pub resolver: Resolver,
    pub encoder: StreamEncoder,
    /// Present when a watcher task is running
    pub reload: Option<ReloadTrigger>,
}

impl AppState {
    pub fn new(
        snapshots: SnapshotHandle,
        tokenizers: TokenizerRegistry,
        dialects: &DialectsConfig,
    ) -> Self {
        Self {
            resolver: Resolver::new(snapshots, tokenizers.clone()),
            encoder: StreamEncoder::new(dialects, tokenizers),
            reload: None,
        }
    }

    pub fn with_reload(mut self, trigger: ReloadTrigger) -> Self {
        self.reload = Some(trigger);
        self
    }
}

/// Build the complete application router
pub fn build_app(app_state: AppState) -> Router {
    Router::new()
        .nest("/v1", build_completion_routes(app_state.clone()))
        .merge(build_mock_routes(app_state))
        .merge(build_openapi_routes())
        .layer(CorsLayer::permissive())
}

/// Build the impersonated API routes, one per dialect
pub fn build_completion_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/messages", post(create_message))
        .with_state(app_state)
}

/// Build health and response-management routes
pub fn build_mock_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/mock/responses", get(list_responses))
        .route("/mock/reload", post(reload_responses))
        .with_state(app_state)
}

/// Build OpenAPI documentation routes
pub fn build_openapi_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
