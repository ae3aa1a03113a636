use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;

use availability_cell::handlers::AvailabilityState;
use availability_cell::router::availability_routes;
use booking_cell::handlers::BookingState;
use booking_cell::router::{booking_routes, slot_deletion_routes};
use session_cell::handlers::SessionState;
use session_cell::router::session_routes;
use shared_config::AppConfig;

use crate::services::Services;

pub fn create_router(config: Arc<AppConfig>, services: &Services) -> Router {
    let availability_state = Arc::new(AvailabilityState {
        config: config.clone(),
        slots: services.slots.clone(),
    });
    let booking_state = Arc::new(BookingState {
        config: config.clone(),
        bookings: services.bookings.clone(),
        cascade: services.cascade.clone(),
    });
    let session_state = Arc::new(SessionState {
        config: config.clone(),
        sessions: services.sessions.clone(),
    });

    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .route(
            "/health",
            get(|| async { Json(json!({ "status": "ok" })) }),
        )
        .nest(
            "/availability",
            availability_routes(availability_state).merge(slot_deletion_routes(booking_state.clone())),
        )
        .nest("/bookings", booking_routes(booking_state))
        .nest("/sessions", session_routes(session_state))
}
