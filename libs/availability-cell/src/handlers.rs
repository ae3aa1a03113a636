// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::actor_from_user;

use crate::models::{CreateSlotRequest, PublishSlotsRequest, SlotWindowQuery};
use crate::services::slots::SlotService;

pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub slots: Arc<SlotService>,
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

pub async fn list_published_slots(
    State(state): State<Arc<AvailabilityState>>,
    Path(partner_id): Path<Uuid>,
    Query(query): Query<SlotWindowQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state.slots.list_published(partner_id, query).await?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}

// ==============================================================================
// PARTNER HANDLERS
// ==============================================================================

pub async fn list_partner_slots(
    State(state): State<Arc<AvailabilityState>>,
    Path(partner_id): Path<Uuid>,
    Query(query): Query<SlotWindowQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let slots = state.slots.list_for_partner(&actor, partner_id, query).await?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}

pub async fn create_slot(
    State(state): State<Arc<AvailabilityState>>,
    Path(partner_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let created = state.slots.create_slot(&actor, partner_id, request).await?;

    Ok(Json(json!(created)))
}

pub async fn publish_slots(
    State(state): State<Arc<AvailabilityState>>,
    Path(partner_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<PublishSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let published = state.slots.publish(&actor, partner_id, request.slot_ids).await?;

    Ok(Json(json!(published)))
}

pub async fn replace_slot(
    State(state): State<Arc<AvailabilityState>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let created = state.slots.replace(&actor, slot_id, request).await?;

    Ok(Json(json!({
        "replaced_slot_id": slot_id,
        "slot": created.slot,
        "conflict_warning": created.conflict_warning
    })))
}

pub async fn check_conflicts(
    State(state): State<Arc<AvailabilityState>>,
    Path(partner_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let report = state.slots.check_conflicts(&actor, partner_id, &request).await?;

    Ok(Json(json!(report)))
}
