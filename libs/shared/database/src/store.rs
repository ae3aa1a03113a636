// libs/shared/database/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, AvailabilitySlot, Booking, BookingChannel, NewAppointment, NewSlot,
    NewVideoSession, PartnerFeeSettings, TimeInterval, VideoSession, VideoSessionStatus,
};

use crate::error::DatabaseError;

pub type StoreResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub partner_id: Uuid,
    pub window: Option<TimeInterval>,
    pub published_only: bool,
}

/// How a successful slot reservation is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReservationMode {
    /// Nothing to collect upfront: the slot is booked and the appointment
    /// created in the same transaction.
    Commit {
        appointment_id: Uuid,
        appointment_title: String,
    },
    /// Payment pending: the slot is held for this booking until `expires_at`.
    Hold { expires_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub slot_id: Uuid,
    pub booking_id: Uuid,
    pub client_id: Uuid,
    pub channel: BookingChannel,
    pub amount_due: i64,
    pub upfront_amount: i64,
    pub currency: String,
    pub order_id: Option<String>,
    pub mode: ReservationMode,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub booking_id: Uuid,
    pub appointment_id: Uuid,
    pub appointment_title: String,
    pub amount_paid: i64,
    pub payment_id: String,
    pub now: DateTime<Utc>,
}

/// Settles the balance of a confirmed booking against its open
/// remaining-payment order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingPaymentRecord {
    pub booking_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub amount_paid: i64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub slot: AvailabilitySlot,
    pub booking: Booking,
    #[serde(default)]
    pub appointment: Option<Appointment>,
}

/// Rows removed (or reset) by a cascade. `booking`/`appointment` are `None`
/// when the slot had nothing depending on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub slot: AvailabilitySlot,
    #[serde(default)]
    pub booking: Option<Booking>,
    #[serde(default)]
    pub appointment: Option<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSessionTransition {
    pub session_id: Uuid,
    pub from: Vec<VideoSessionStatus>,
    pub to: VideoSessionStatus,
    pub therapy_session_id: Option<Uuid>,
    /// Only apply while no session record is linked.
    pub require_unlinked: bool,
    pub auto_completed: bool,
    pub now: DateTime<Utc>,
}

/// Persistence boundary for the scheduling engine.
///
/// Every method returning `Option` on a conditional write returns `None`
/// when the condition did not hold; no rows were changed in that case.
/// Multi-row operations are all-or-nothing.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    // Slots
    async fn insert_slot(&self, slot: NewSlot) -> StoreResult<AvailabilitySlot>;
    async fn get_slot(&self, slot_id: Uuid) -> StoreResult<Option<AvailabilitySlot>>;
    async fn list_slots(&self, query: SlotQuery) -> StoreResult<Vec<AvailabilitySlot>>;
    /// Publishes the partner's unpublished, non-booked, non-archived slots.
    async fn publish_slots(
        &self,
        partner_id: Uuid,
        slot_ids: Option<Vec<Uuid>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AvailabilitySlot>>;
    async fn record_slot_conflicts(
        &self,
        slot_id: Uuid,
        has_conflict: bool,
        details: Option<Value>,
    ) -> StoreResult<Option<AvailabilitySlot>>;
    /// Deletes a slot that is neither booked nor held.
    async fn delete_unbooked_slot(&self, slot_id: Uuid) -> StoreResult<Option<AvailabilitySlot>>;
    async fn archive_slots_ended_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    // Bookings
    /// Compare-and-set reservation; `None` when the slot is not reservable or
    /// another slot of the same partner overlapping it is booked or held.
    async fn reserve_slot(&self, request: ReservationRequest) -> StoreResult<Option<Reservation>>;
    /// `None` when the booking is no longer pending, its hold was lost, or an
    /// overlapping slot of the partner was claimed meanwhile.
    async fn confirm_reservation(
        &self,
        confirmation: PaymentConfirmation,
    ) -> StoreResult<Option<Reservation>>;
    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;
    async fn active_booking_for_slot(&self, slot_id: Uuid) -> StoreResult<Option<Booking>>;
    /// Attaches a balance order to a confirmed booking whose balance is unpaid.
    async fn open_remaining_order(
        &self,
        booking_id: Uuid,
        order_id: String,
    ) -> StoreResult<Option<Booking>>;
    /// `None` unless the booking is confirmed, `order_id` is its open balance
    /// order, and no balance payment was recorded yet.
    async fn record_remaining_payment(
        &self,
        record: RemainingPaymentRecord,
    ) -> StoreResult<Option<Booking>>;
    /// Cancels pending bookings whose hold expired and releases their slots.
    async fn expire_pending_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;
    /// Deletes the booking and its appointment, resetting the slot to bookable.
    async fn cancel_booking(&self, booking_id: Uuid) -> StoreResult<Option<CascadeOutcome>>;
    /// Deletes the slot together with any active booking and its appointment.
    async fn delete_slot_cascade(&self, slot_id: Uuid) -> StoreResult<Option<CascadeOutcome>>;

    // Appointments
    async fn insert_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment>;
    async fn list_appointments_overlapping(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> StoreResult<Vec<Appointment>>;

    // Video sessions
    async fn insert_video_session(&self, session: NewVideoSession) -> StoreResult<VideoSession>;
    async fn get_video_session(&self, session_id: Uuid) -> StoreResult<Option<VideoSession>>;
    async fn list_video_sessions_overlapping(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> StoreResult<Vec<VideoSession>>;
    /// Open sessions without a session record that ended before `cutoff`.
    async fn list_stale_video_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<VideoSession>>;
    async fn transition_video_session(
        &self,
        transition: VideoSessionTransition,
    ) -> StoreResult<Option<VideoSession>>;

    // Fees
    async fn get_fee_settings(&self, partner_id: Uuid) -> StoreResult<Option<PartnerFeeSettings>>;
}
