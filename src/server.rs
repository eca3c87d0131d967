//! # Server Configuration
//!
//! Application state wiring, router construction, and server startup for the
//! LLM admin control plane.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth;
use crate::config::AppConfig;
use crate::handlers;
use crate::proxy::ProxyClient;
use crate::repositories::{AuditLogRepository, SubscriptionRepository};
use crate::services::{ApiKeyService, AuditService, ModelSyncService, SubscriptionService};
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub proxy: Arc<ProxyClient>,
    pub api_keys: Arc<ApiKeyService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub model_sync: Arc<ModelSyncService>,
}

impl AppState {
    /// Wires the full service graph: one proxy client instance shared by
    /// every service that talks to the proxy.
    pub fn new(db: DatabaseConnection, config: AppConfig) -> anyhow::Result<Self> {
        let db = Arc::new(db);
        let config = Arc::new(config);

        let proxy = Arc::new(ProxyClient::new(config.proxy.clone())?);
        let audit = AuditService::new(AuditLogRepository::new(Arc::clone(&db)));

        let api_keys = Arc::new(ApiKeyService::new(
            Arc::clone(&db),
            Arc::clone(&proxy),
            audit.clone(),
            Arc::clone(&config),
        ));
        let subscriptions = Arc::new(SubscriptionService::new(
            SubscriptionRepository::new(Arc::clone(&db)),
            Arc::clone(&api_keys),
            audit.clone(),
        ));
        let model_sync = Arc::new(ModelSyncService::new(
            Arc::clone(&db),
            Arc::clone(&proxy),
            Arc::clone(&subscriptions),
            audit,
        ));

        Ok(Self {
            db,
            config,
            proxy,
            api_keys,
            subscriptions,
            model_sync,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        // model catalog
        .route("/models", get(handlers::models::list_models))
        .route("/models", post(handlers::models::create_model))
        .route("/models/sync", post(handlers::models::sync_models))
        .route("/models/validate", get(handlers::models::validate_models))
        .route("/models/stats", get(handlers::models::sync_stats))
        .route("/models/{model_id}", patch(handlers::models::update_model))
        .route("/models/{model_id}", delete(handlers::models::delete_model))
        .route(
            "/models/{model_id}/unavailable",
            post(handlers::models::mark_unavailable),
        )
        .route(
            "/models/{model_id}/restriction",
            patch(handlers::models::update_restriction),
        )
        // subscriptions
        .route(
            "/users/{user_id}/subscriptions",
            get(handlers::subscriptions::list_user_subscriptions),
        )
        .route(
            "/users/{user_id}/subscriptions/ensure-active",
            post(handlers::subscriptions::ensure_active),
        )
        .route(
            "/subscriptions/{subscription_id}/history",
            get(handlers::subscriptions::status_history),
        )
        // api keys
        .route(
            "/users/{user_id}/api-keys",
            post(handlers::api_keys::create_api_key),
        )
        .route(
            "/users/{user_id}/api-keys",
            get(handlers::api_keys::list_api_keys),
        )
        .route(
            "/users/{user_id}/api-keys/{key_id}",
            patch(handlers::api_keys::update_api_key),
        )
        .route(
            "/users/{user_id}/api-keys/{key_id}",
            delete(handlers::api_keys::delete_api_key),
        )
        .route(
            "/users/{user_id}/api-keys/{key_id}/rotate",
            post(handlers::api_keys::rotate_api_key),
        )
        .route(
            "/users/{user_id}/api-keys/{key_id}/full",
            get(handlers::api_keys::retrieve_full_key),
        )
        .route(
            "/api-keys/validate",
            post(handlers::api_keys::validate_api_key),
        )
        .route(
            "/api-keys/repair-hashes",
            post(handlers::api_keys::repair_key_hashes),
        )
        // usage
        .route("/usage/daily", get(handlers::usage::daily_activity))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = config.api_bind_addr.parse()?;
    let state = AppState::new(db, config)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::models::list_models,
        crate::handlers::models::create_model,
        crate::handlers::models::sync_models,
        crate::handlers::models::validate_models,
        crate::handlers::models::sync_stats,
        crate::handlers::models::update_model,
        crate::handlers::models::delete_model,
        crate::handlers::models::mark_unavailable,
        crate::handlers::models::update_restriction,
        crate::handlers::subscriptions::list_user_subscriptions,
        crate::handlers::subscriptions::ensure_active,
        crate::handlers::subscriptions::status_history,
        crate::handlers::api_keys::create_api_key,
        crate::handlers::api_keys::list_api_keys,
        crate::handlers::api_keys::update_api_key,
        crate::handlers::api_keys::delete_api_key,
        crate::handlers::api_keys::rotate_api_key,
        crate::handlers::api_keys::retrieve_full_key,
        crate::handlers::api_keys::validate_api_key,
        crate::handlers::api_keys::repair_key_hashes,
        crate::handlers::usage::daily_activity,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::services::api_keys::CreateKeyRequest,
            crate::services::api_keys::MultiModelKeyRequest,
            crate::services::api_keys::LegacyKeyRequest,
            crate::services::api_keys::CreatedKey,
            crate::services::api_keys::KeySummary,
            crate::services::api_keys::ModelRemovalReport,
            crate::services::model_sync::SyncReport,
            crate::services::model_sync::CascadeStats,
            crate::services::model_sync::ValidationReport,
            crate::services::model_sync::ModelIssue,
            crate::services::model_sync::SyncStats,
            crate::services::model_sync::RestrictionChange,
            crate::services::model_sync::ModelDefinition,
            crate::services::subscriptions::ProvisionOutcome,
            crate::services::subscriptions::RestrictionCascadeReport,
        )
    ),
    info(
        title = "LLM Admin API",
        description = "Administrative control plane for LLM backends behind a model-serving proxy",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
