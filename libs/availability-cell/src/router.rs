use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    // Clients browse published slots without signing in
    let public_routes = Router::new()
        .route("/partners/{partner_id}/slots", get(handlers::list_published_slots));

    let protected_routes = Router::new()
        .route("/partners/{partner_id}/slots", post(handlers::create_slot))
        .route("/partners/{partner_id}/slots/all", get(handlers::list_partner_slots))
        .route("/partners/{partner_id}/slots/publish", post(handlers::publish_slots))
        .route("/partners/{partner_id}/conflicts", post(handlers::check_conflicts))
        .route("/slots/{slot_id}", put(handlers::replace_slot))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
