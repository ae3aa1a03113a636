// libs/session-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::actor_from_user;

use crate::models::{DirectAppointmentRequest, ScheduleSessionRequest, SessionError};
use crate::services::lifecycle::SessionLifecycleManager;

pub struct SessionState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionLifecycleManager>,
}

pub async fn schedule_session(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ScheduleSessionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor_from_user(&user)?;

    match state.sessions.schedule(&actor, request).await {
        Ok(scheduled) => Ok((StatusCode::CREATED, Json(json!(scheduled)))),
        // The caller has to pick create_anyway or skip_appointment
        Err(SessionError::ConflictsFound(report)) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Proposed session conflicts with existing schedule",
                "requires_decision": true,
                "conflicts": report
            })),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn create_appointment(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<User>,
    Json(request): Json<DirectAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor_from_user(&user)?;
    let appointment = state.sessions.create_appointment(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

pub async fn get_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let session = state.sessions.get_session(&actor, session_id).await?;

    Ok(Json(json!(session)))
}

pub async fn start_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let session = state.sessions.start(&actor, session_id).await?;

    Ok(Json(json!(session)))
}

pub async fn complete_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let session = state.sessions.complete(&actor, session_id).await?;

    Ok(Json(json!(session)))
}

pub async fn cancel_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let session = state.sessions.cancel(&actor, session_id).await?;

    Ok(Json(json!(session)))
}
