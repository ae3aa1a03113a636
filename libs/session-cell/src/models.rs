// libs/session-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use availability_cell::{AvailabilityError, ConflictReport};
use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, VideoSession, VideoSessionStatus};

use crate::services::records::MaterializeError;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// What to do when the proposed session overlaps something.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Create the session and its appointment regardless.
    CreateAnyway,
    /// Create the session only; no appointment is added to the schedule.
    SkipAppointment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSessionRequest {
    /// Defaults to the caller when omitted.
    #[serde(default)]
    pub partner_id: Option<Uuid>,
    pub client_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: i64,
    pub timezone: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub decision: Option<ConflictDecision>,
}

/// Appointment a provider adds to their own schedule without a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectAppointmentRequest {
    #[serde(default)]
    pub partner_id: Option<Uuid>,
    pub client_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: i64,
    pub timezone: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

// ==============================================================================
// RESULT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub session: VideoSession,
    #[serde(default)]
    pub appointment: Option<Appointment>,
    /// Conflicts the caller chose to override.
    #[serde(default)]
    pub conflict_report: Option<ConflictReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SessionError {
    #[error("Video session not found")]
    SessionNotFound,

    #[error("Cannot move session from {from} to {to}")]
    InvalidStatusTransition {
        from: VideoSessionStatus,
        to: VideoSessionStatus,
    },

    #[error("Proposed session has {} conflict(s)", .0.conflicts.len())]
    ConflictsFound(ConflictReport),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized access to session")]
    Unauthorized,

    #[error("Session record could not be created: {0}")]
    Materialization(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DatabaseError> for SessionError {
    fn from(err: DatabaseError) -> Self {
        SessionError::DatabaseError(err.to_string())
    }
}

impl From<AvailabilityError> for SessionError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidTimeZone(_) | AvailabilityError::InvalidTimeRange(_) => {
                SessionError::InvalidTime(err.to_string())
            }
            AvailabilityError::Unauthorized => SessionError::Unauthorized,
            AvailabilityError::DatabaseError(msg) => SessionError::DatabaseError(msg),
            other => SessionError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<MaterializeError> for SessionError {
    fn from(err: MaterializeError) -> Self {
        SessionError::Materialization(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionNotFound => AppError::NotFound(err.to_string()),
            SessionError::InvalidStatusTransition { .. } | SessionError::ConflictsFound(_) => {
                AppError::Conflict(err.to_string())
            }
            SessionError::InvalidTime(msg) => AppError::BadRequest(msg),
            SessionError::InvalidRequest(_) => AppError::BadRequest(err.to_string()),
            SessionError::Unauthorized => AppError::Forbidden(err.to_string()),
            SessionError::Materialization(_) => AppError::ExternalService(err.to_string()),
            SessionError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
