use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, SessionState};

pub fn session_routes(state: Arc<SessionState>) -> Router {
    Router::new()
        .route("/", post(handlers::schedule_session))
        .route("/appointments", post(handlers::create_appointment))
        .route("/{session_id}", get(handlers::get_session))
        .route("/{session_id}/start", post(handlers::start_session))
        .route("/{session_id}/complete", post(handlers::complete_session))
        .route("/{session_id}/cancel", post(handlers::cancel_session))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
