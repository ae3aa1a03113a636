// libs/availability-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_models::scheduling::{AvailabilitySlot, SlotStatus, TimeInterval};

// ==============================================================================
// CONFLICTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSource {
    ExternalCalendar,
    Appointment,
    VideoSession,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub source: ConflictSource,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl Conflict {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start,
            end: self.end,
        }
    }
}

/// Advisory result of a conflict check. Never blocks a write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    /// The external calendar failed or timed out; only internal data was checked.
    pub calendar_unreachable: bool,
    /// Internal appointments or sessions could not be read.
    #[serde(default)]
    pub store_unreachable: bool,
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn has_external_conflict(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.source == ConflictSource::ExternalCalendar)
    }

    /// Worth surfacing to the caller: something overlaps or a source was skipped.
    pub fn needs_attention(&self) -> bool {
        self.has_conflicts() || self.calendar_unreachable || self.store_unreachable
    }
}

/// Read-only projection of an event on the provider's external calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalCalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ==============================================================================
// SLOT REQUESTS AND RESPONSES
// ==============================================================================

/// Wall-clock slot definition in the provider's timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM` or `HH:MM:SS`
    pub start_time: String,
    pub end_time: String,
    pub timezone: String,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishSlotsRequest {
    #[serde(default)]
    pub slot_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSlotsResponse {
    pub published: usize,
    pub slots: Vec<AvailabilitySlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSlot {
    pub slot: AvailabilitySlot,
    #[serde(default)]
    pub conflict_warning: Option<ConflictReport>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotWindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSlotView {
    pub slot: AvailabilitySlot,
    pub local_date: String,
    pub local_start_time: String,
    pub local_end_time: String,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum AvailabilityError {
    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid slot status: {0}")]
    InvalidStatus(String),

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Unauthorized access to partner schedule")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DatabaseError> for AvailabilityError {
    fn from(err: DatabaseError) -> Self {
        AvailabilityError::DatabaseError(err.to_string())
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidTimeZone(_)
            | AvailabilityError::InvalidTimeRange(_)
            | AvailabilityError::InvalidStatus(_) => AppError::ValidationError(err.to_string()),
            AvailabilityError::SlotNotFound => AppError::NotFound(err.to_string()),
            AvailabilityError::SlotUnavailable(_) => AppError::Conflict(err.to_string()),
            AvailabilityError::Unauthorized => AppError::Forbidden(err.to_string()),
            AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
