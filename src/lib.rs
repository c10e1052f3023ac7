pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::IngestConfig;
use crate::services::ingest::UploadIngestor;
use crate::services::message_service::MessageService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::read_root,
        api::handlers::health::health_check,
        api::handlers::translation::translate_audio,
        api::handlers::translation::get_validation_policy,
        api::handlers::messages::create_message,
        api::handlers::messages::list_messages,
    ),
    components(
        schemas(
            api::handlers::health::RootResponse,
            api::handlers::health::HealthResponse,
            api::handlers::translation::TranslateAudioForm,
            api::handlers::translation::TranslationResponse,
            api::handlers::messages::CreateMessageRequest,
            api::handlers::messages::CreateMessageResponse,
            api::handlers::messages::MessageResponse,
            utils::validation::ValidationPolicy,
        )
    ),
    tags(
        (name = "system", description = "Service status endpoints"),
        (name = "translation", description = "Animal sound translation endpoints"),
        (name = "messages", description = "Message storage endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub ingestor: Arc<UploadIngestor>,
    pub message_service: Arc<MessageService>,
    pub config: IngestConfig,
}

pub fn create_app(state: AppState) -> Router {
    let upload_limit = match state.config.body_limit() {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::health::read_root))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/translate-audio",
            post(api::handlers::translation::translate_audio).layer(upload_limit),
        )
        .route(
            "/api/validation-policy",
            get(api::handlers::translation::get_validation_policy),
        )
        .route(
            "/api/messages",
            post(api::handlers::messages::create_message)
                .get(api::handlers::messages::list_messages),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
