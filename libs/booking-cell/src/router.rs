use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, BookingState};

pub fn booking_routes(state: Arc<BookingState>) -> Router {
    // Public booking flow: the checkout page books and confirms without a session
    let public_routes = Router::new()
        .route("/public", post(handlers::create_public_booking))
        .route("/{booking_id}/confirm", post(handlers::confirm_booking_payment));

    let protected_routes = Router::new()
        .route("/", post(handlers::create_booking))
        .route("/{booking_id}", get(handlers::get_booking))
        .route("/{booking_id}/cancel", post(handlers::cancel_booking))
        .route("/{booking_id}/pay-remaining", post(handlers::pay_remaining))
        .route("/{booking_id}/confirm-remaining", post(handlers::confirm_remaining_payment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Slot deletion cascades through bookings, so it lives here and is mounted
/// next to the availability routes.
pub fn slot_deletion_routes(state: Arc<BookingState>) -> Router {
    Router::new()
        .route("/slots/{slot_id}", delete(handlers::delete_slot))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
