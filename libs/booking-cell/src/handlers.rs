// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::scheduling::BookingChannel;
use shared_utils::extractor::actor_from_user;

use crate::models::{AttemptBookingRequest, BookingResult, PaymentEvidence, PublicBookingRequest};
use crate::services::booking::BookingService;
use crate::services::cascade::CascadeDeletionCoordinator;

pub struct BookingState {
    pub config: Arc<AppConfig>,
    pub bookings: Arc<BookingService>,
    pub cascade: Arc<CascadeDeletionCoordinator>,
}

fn booking_response(result: BookingResult) -> Json<Value> {
    let requires_payment = result.requires_payment();
    Json(json!({
        "booking": result.booking,
        "slot": result.slot,
        "appointment": result.appointment,
        "order": result.order,
        "channel": result.channel,
        "requires_payment": requires_payment
    }))
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

pub async fn create_public_booking(
    State(state): State<Arc<BookingState>>,
    Json(request): Json<PublicBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let result = state
        .bookings
        .attempt(request.slot_id, request.client_id, BookingChannel::Public)
        .await?;

    Ok(booking_response(result))
}

pub async fn confirm_booking_payment(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Json(evidence): Json<PaymentEvidence>,
) -> Result<Json<Value>, AppError> {
    let result = state.bookings.confirm_payment(booking_id, evidence).await?;

    Ok(booking_response(result))
}

// ==============================================================================
// CLIENT HANDLERS
// ==============================================================================

pub async fn create_booking(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<AttemptBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let result = state
        .bookings
        .attempt(request.slot_id, actor.id, BookingChannel::Client)
        .await?;

    Ok(booking_response(result))
}

pub async fn get_booking(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let booking = state.bookings.get_booking(&actor, booking_id).await?;

    Ok(Json(json!({
        "booking": booking,
        "outstanding": booking.outstanding()
    })))
}

pub async fn cancel_booking(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let result = state.cascade.cancel_booking(booking_id, &actor).await?;

    Ok(Json(json!(result)))
}

pub async fn pay_remaining(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let payment = state.bookings.pay_remaining(&actor, booking_id).await?;

    Ok(Json(json!(payment)))
}

pub async fn confirm_remaining_payment(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(evidence): Json<PaymentEvidence>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let booking = state
        .bookings
        .confirm_remaining(&actor, booking_id, evidence)
        .await?;

    Ok(Json(json!({
        "booking": booking,
        "outstanding": booking.outstanding()
    })))
}

// ==============================================================================
// PARTNER HANDLERS
// ==============================================================================

pub async fn delete_slot(
    State(state): State<Arc<BookingState>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let result = state.cascade.delete_slot(slot_id, &actor).await?;

    Ok(Json(json!(result)))
}
