// libs/shared/models/src/scheduling.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// TIME INTERVALS
// ==============================================================================

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }
}

// ==============================================================================
// AVAILABILITY SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    AvailableOnline,
    AvailableOffline,
    NotAvailable,
    Booked,
}

impl SlotStatus {
    /// Statuses a client may reserve.
    pub fn is_bookable(&self) -> bool {
        matches!(self, SlotStatus::AvailableOnline | SlotStatus::AvailableOffline)
    }

    pub fn location_type(&self) -> Option<LocationType> {
        match self {
            SlotStatus::AvailableOnline => Some(LocationType::Online),
            SlotStatus::AvailableOffline => Some(LocationType::Offline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::AvailableOnline => "available_online",
            SlotStatus::AvailableOffline => "available_offline",
            SlotStatus::NotAvailable => "not_available",
            SlotStatus::Booked => "booked",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Online,
    Offline,
}

impl LocationType {
    pub fn appointment_title(&self) -> &'static str {
        match self {
            LocationType::Online => "Therapy Session - Online",
            LocationType::Offline => "Therapy Session - In-Person",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    /// IANA zone the provider entered the slot in; display only.
    pub timezone: String,
    pub status: SlotStatus,
    pub is_published: bool,
    #[serde(default)]
    pub has_external_conflict: bool,
    #[serde(default)]
    pub conflict_details: Option<Value>,
    #[serde(default)]
    pub held_by_booking_id: Option<Uuid>,
    #[serde(default)]
    pub hold_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub booked_by_client_id: Option<Uuid>,
    #[serde(default)]
    pub booked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start_datetime,
            end: self.end_datetime,
        }
    }

    /// A pending-payment hold that has not yet expired.
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        match (self.held_by_booking_id, self.hold_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Booked or under a live hold; the partner is committed for this time.
    pub fn is_claimed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Booked || self.is_held_at(now)
    }

    pub fn is_reservable_at(&self, now: DateTime<Utc>) -> bool {
        self.archived_at.is_none()
            && self.is_published
            && self.status.is_bookable()
            && !self.is_held_at(now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSlot {
    pub partner_id: Uuid,
    pub interval: TimeInterval,
    pub timezone: String,
    pub status: SlotStatus,
}

// ==============================================================================
// BOOKINGS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::PendingPayment => write!(f, "pending_payment"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which flow the booking came through; decides the upfront fee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingChannel {
    #[default]
    Client,
    Public,
}

/// Amounts are integer minor currency units (paise, cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub partner_id: Uuid,
    pub client_id: Uuid,
    pub status: BookingStatus,
    pub channel: BookingChannel,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub upfront_amount: i64,
    pub currency: String,
    /// Gateway order for the upfront amount.
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Gateway order for the balance, opened by pay-remaining.
    #[serde(default)]
    pub remaining_order_id: Option<String>,
    #[serde(default)]
    pub remaining_payment_id: Option<String>,
    /// Bookable status the slot returns to if this booking is cancelled.
    pub slot_prior_status: SlotStatus,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn outstanding(&self) -> i64 {
        (self.amount_due - self.amount_paid).max(0)
    }

    /// Whether `payment_id` was already credited to this booking.
    pub fn has_recorded_payment(&self, payment_id: &str) -> bool {
        self.payment_id.as_deref() == Some(payment_id)
            || self.remaining_payment_id.as_deref() == Some(payment_id)
    }

    pub fn requires_refund_attention(&self) -> bool {
        self.amount_paid > 0
    }

    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub client_id: Uuid,
    #[serde(default)]
    pub slot_id: Option<Uuid>,
    pub title: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start_datetime,
            end: self.end_datetime,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub partner_id: Uuid,
    pub client_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub title: String,
    pub interval: TimeInterval,
    pub notes: Option<String>,
}

// ==============================================================================
// VIDEO SESSIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoSessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl VideoSessionStatus {
    pub fn valid_transitions(&self) -> &'static [VideoSessionStatus] {
        match self {
            VideoSessionStatus::Scheduled => &[
                VideoSessionStatus::InProgress,
                VideoSessionStatus::Completed,
                VideoSessionStatus::Cancelled,
            ],
            VideoSessionStatus::InProgress => &[
                VideoSessionStatus::Completed,
                VideoSessionStatus::Cancelled,
            ],
            VideoSessionStatus::Completed | VideoSessionStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: VideoSessionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, VideoSessionStatus::Scheduled | VideoSessionStatus::InProgress)
    }
}

impl fmt::Display for VideoSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSessionStatus::Scheduled => write!(f, "scheduled"),
            VideoSessionStatus::InProgress => write!(f, "in_progress"),
            VideoSessionStatus::Completed => write!(f, "completed"),
            VideoSessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSession {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub timezone: String,
    pub status: VideoSessionStatus,
    #[serde(default)]
    pub therapy_session_id: Option<Uuid>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub auto_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoSession {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start_datetime,
            end: self.end_datetime,
        }
    }

    pub fn has_session_record(&self) -> bool {
        self.therapy_session_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVideoSession {
    pub partner_id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub interval: TimeInterval,
    pub timezone: String,
    pub appointment_id: Option<Uuid>,
}

/// Handle to the permanent clinical record owned by the session-notes service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub video_session_id: Uuid,
}

// ==============================================================================
// FEES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerFeeSettings {
    pub partner_id: Uuid,
    #[serde(default)]
    pub session_fee: Option<i64>,
    #[serde(default)]
    pub booking_fee: Option<i64>,
    pub currency: String,
}

impl PartnerFeeSettings {
    pub fn session_fee(&self) -> i64 {
        self.session_fee.unwrap_or(0).max(0)
    }

    pub fn booking_fee(&self) -> i64 {
        self.booking_fee.unwrap_or(0).max(0)
    }

    /// Amount collected before the booking is confirmed.
    pub fn upfront_for(&self, channel: BookingChannel) -> i64 {
        match channel {
            BookingChannel::Client => self.booking_fee(),
            BookingChannel::Public => self.session_fee(),
        }
    }

    /// Total owed for the session; never less than what is collected upfront.
    pub fn total_due_for(&self, channel: BookingChannel) -> i64 {
        self.session_fee().max(self.upfront_for(channel))
    }
}
