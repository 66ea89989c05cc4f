//! Application setup and router assembly.

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::kernel::StreamHub;
use crate::server::routes::{
    create_rule_handler, deactivate_rule_handler, event_attempts_handler, event_stats_handler,
    get_event_handler, get_rule_handler, health_handler, ingest_event_handler, list_events_handler,
    list_rules_handler, replay_batch_handler, replay_event_handler, requeue_stuck_handler,
    rule_versions_handler, update_rule_handler, ws_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub hub: StreamHub,
    pub config: Arc<Config>,
}

/// Build the Axum application router
pub fn build_app(pool: PgPool, hub: StreamHub, config: Arc<Config>) -> Router {
    let app_state = AppState {
        db_pool: pool,
        hub,
        config: config.clone(),
    };

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([CONTENT_TYPE])
    };

    Router::new()
        // Event intake and reads
        .route("/events", post(ingest_event_handler).get(list_events_handler))
        .route("/events/stats", get(event_stats_handler))
        .route("/events/replay-batch", post(replay_batch_handler))
        .route("/events/requeue-stuck", post(requeue_stuck_handler))
        .route("/events/:id", get(get_event_handler))
        .route("/events/:id/attempts", get(event_attempts_handler))
        .route("/events/:id/replay", post(replay_event_handler))
        // Rule CRUD
        .route("/rules", post(create_rule_handler).get(list_rules_handler))
        .route(
            "/rules/:id",
            get(get_rule_handler)
                .put(update_rule_handler)
                .delete(deactivate_rule_handler),
        )
        .route("/rules/:id/versions", get(rule_versions_handler))
        // Live updates
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_handler))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
