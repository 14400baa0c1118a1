use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/providers/{provider_id}/services/{service_id}/slots", get(handlers::get_available_slots_public));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        // Weekly pattern management
        .route("/providers/{provider_id}/services/{service_id}/week", get(handlers::get_week))
        .route("/providers/{provider_id}/services/{service_id}/week", put(handlers::replace_week))
        .route("/providers/{provider_id}/services/{service_id}/switch", post(handlers::switch_service))

        // Date-specific overrides
        .route("/providers/{provider_id}/services/{service_id}/overrides", get(handlers::list_overrides))
        .route("/providers/{provider_id}/services/{service_id}/overrides", post(handlers::create_override))
        .route("/providers/{provider_id}/services/{service_id}/overrides/{date}", delete(handlers::delete_override))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
