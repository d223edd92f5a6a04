// [apps/monitor-api/src/routes.rs]
//! =================================================================
//! APARATO: ROUTING TABLE (V1.0)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
//! RESPONSABILIDAD: COMPOSICIÓN DEL ROUTER AXUM Y SUS CAPAS
//! =================================================================

use crate::handlers::health::handle_health_check;
use crate::handlers::incidents::IncidentsHandler;
use crate::handlers::ingest::IngestHandler;
use crate::handlers::notifications::NotificationsHandler;
use crate::middleware::auth_guard;
use crate::state::AppState;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, "x-ingest-id".parse().unwrap()])
        .max_age(Duration::from_secs(3600));

    let authenticated = Router::new()
        .route("/ingest/metrics", post(IngestHandler::handle_ingest_metrics))
        .route("/incidents", get(IncidentsHandler::handle_list_incidents))
        .route("/notifications", get(NotificationsHandler::handle_list_notifications))
        .route("/notifications/:id/read", post(NotificationsHandler::handle_mark_as_read))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    Router::new()
        .route("/health", get(handle_health_check))
        .nest("/api/v1", authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
