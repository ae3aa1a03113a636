// libs/shared/database/src/memory.rs
//! Process-local `SchedulingStore` used by tests and local development.
//!
//! Each operation runs against a working copy of the state that is swapped in
//! only when the whole operation succeeds, so multi-row writes are
//! all-or-nothing exactly like the Postgres functions behind the Supabase
//! store. Fail points let tests abort an operation midway.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, AppointmentStatus, AvailabilitySlot, Booking, BookingStatus, NewAppointment,
    NewSlot, NewVideoSession, PartnerFeeSettings, SlotStatus, TimeInterval, VideoSession,
    VideoSessionStatus,
};

use crate::error::DatabaseError;
use crate::store::{
    CascadeOutcome, PaymentConfirmation, RemainingPaymentRecord, Reservation, ReservationMode,
    ReservationRequest, SchedulingStore, SlotQuery, StoreResult, VideoSessionTransition,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Abort a slot cascade after the booking row is gone.
    CascadeAfterBookingDelete,
    /// Abort a booking cancellation after the booking row is gone.
    CancelAfterBookingDelete,
    /// Abort a payment confirmation after the booking row is updated.
    ConfirmAfterBookingUpdate,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    slots: HashMap<Uuid, AvailabilitySlot>,
    bookings: HashMap<Uuid, Booking>,
    appointments: HashMap<Uuid, Appointment>,
    video_sessions: HashMap<Uuid, VideoSession>,
    fees: HashMap<Uuid, PartnerFeeSettings>,
}

#[derive(Default)]
pub struct InMemorySchedulingStore {
    state: Mutex<MemoryState>,
    fail_points: Mutex<Vec<FailPoint>>,
}

fn poisoned<T>(_: T) -> DatabaseError {
    DatabaseError::Aborted("in-memory store lock poisoned".to_string())
}

fn checkpoint(armed: &mut Vec<FailPoint>, point: FailPoint) -> StoreResult<()> {
    if let Some(pos) = armed.iter().position(|p| *p == point) {
        armed.remove(pos);
        debug!("Fail point {:?} triggered", point);
        return Err(DatabaseError::Aborted(format!("simulated failure at {:?}", point)));
    }
    Ok(())
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure for the next operation that reaches `point`.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut armed) = self.fail_points.lock() {
            armed.push(point);
        }
    }

    pub fn set_fee_settings(&self, settings: PartnerFeeSettings) {
        if let Ok(mut state) = self.state.lock() {
            state.fees.insert(settings.partner_id, settings);
        }
    }

    pub fn appointment_exists(&self, appointment_id: Uuid) -> bool {
        self.state
            .lock()
            .map(|state| state.appointments.contains_key(&appointment_id))
            .unwrap_or(false)
    }

    pub fn booking_exists(&self, booking_id: Uuid) -> bool {
        self.state
            .lock()
            .map(|state| state.bookings.contains_key(&booking_id))
            .unwrap_or(false)
    }

    pub fn appointment_count(&self) -> usize {
        self.state.lock().map(|state| state.appointments.len()).unwrap_or(0)
    }

    /// Runs `op` on a working copy and commits it only on success.
    fn transaction<T>(
        &self,
        op: impl FnOnce(&mut MemoryState, &mut Vec<FailPoint>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.lock().map_err(poisoned)?;
        let mut armed = self.fail_points.lock().map_err(poisoned)?;

        let mut working = state.clone();
        let result = op(&mut working, &mut armed)?;
        *state = working;
        Ok(result)
    }

    fn read<T>(&self, op: impl FnOnce(&MemoryState) -> T) -> StoreResult<T> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(op(&state))
    }
}

/// Another live slot of the same partner overlapping `slot` is booked or held.
fn overlapping_claim(state: &MemoryState, slot: &AvailabilitySlot, now: DateTime<Utc>) -> Option<Uuid> {
    let interval = slot.interval();
    state
        .slots
        .values()
        .find(|other| {
            other.id != slot.id
                && other.partner_id == slot.partner_id
                && other.archived_at.is_none()
                && other.interval().overlaps(&interval)
                && other.is_claimed_at(now)
        })
        .map(|other| other.id)
}

fn reset_slot_after_release(slot: &mut AvailabilitySlot, booking: &Booking, now: DateTime<Utc>) {
    if slot.held_by_booking_id == Some(booking.id) {
        slot.held_by_booking_id = None;
        slot.hold_expires_at = None;
    }
    if slot.status == SlotStatus::Booked {
        slot.status = booking.slot_prior_status;
        slot.booked_by_client_id = None;
        slot.booked_at = None;
        slot.appointment_id = None;
    }
    slot.updated_at = now;
}

#[async_trait]
impl SchedulingStore for InMemorySchedulingStore {
    async fn insert_slot(&self, slot: NewSlot) -> StoreResult<AvailabilitySlot> {
        self.transaction(|state, _| {
            let now = Utc::now();
            let created = AvailabilitySlot {
                id: Uuid::new_v4(),
                partner_id: slot.partner_id,
                start_datetime: slot.interval.start,
                end_datetime: slot.interval.end,
                timezone: slot.timezone,
                status: slot.status,
                is_published: false,
                has_external_conflict: false,
                conflict_details: None,
                held_by_booking_id: None,
                hold_expires_at: None,
                booked_by_client_id: None,
                booked_at: None,
                appointment_id: None,
                last_published_at: None,
                archived_at: None,
                created_at: now,
                updated_at: now,
            };
            state.slots.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn get_slot(&self, slot_id: Uuid) -> StoreResult<Option<AvailabilitySlot>> {
        self.read(|state| {
            state
                .slots
                .get(&slot_id)
                .filter(|slot| slot.archived_at.is_none())
                .cloned()
        })
    }

    async fn list_slots(&self, query: SlotQuery) -> StoreResult<Vec<AvailabilitySlot>> {
        self.read(|state| {
            let mut slots: Vec<AvailabilitySlot> = state
                .slots
                .values()
                .filter(|slot| slot.partner_id == query.partner_id && slot.archived_at.is_none())
                .filter(|slot| !query.published_only || slot.is_published)
                .filter(|slot| {
                    query
                        .window
                        .map(|window| window.overlaps(&slot.interval()))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            slots.sort_by_key(|slot| slot.start_datetime);
            slots
        })
    }

    async fn publish_slots(
        &self,
        partner_id: Uuid,
        slot_ids: Option<Vec<Uuid>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AvailabilitySlot>> {
        self.transaction(|state, _| {
            let mut published = Vec::new();
            for slot in state.slots.values_mut() {
                let selected = slot_ids
                    .as_ref()
                    .map(|ids| ids.contains(&slot.id))
                    .unwrap_or(true);
                if slot.partner_id == partner_id
                    && selected
                    && !slot.is_published
                    && slot.status != SlotStatus::Booked
                    && slot.archived_at.is_none()
                {
                    slot.is_published = true;
                    slot.last_published_at = Some(now);
                    slot.updated_at = now;
                    published.push(slot.clone());
                }
            }
            Ok(published)
        })
    }

    async fn record_slot_conflicts(
        &self,
        slot_id: Uuid,
        has_conflict: bool,
        details: Option<Value>,
    ) -> StoreResult<Option<AvailabilitySlot>> {
        self.transaction(|state, _| {
            Ok(state.slots.get_mut(&slot_id).map(|slot| {
                slot.has_external_conflict = has_conflict;
                slot.conflict_details = details;
                slot.updated_at = Utc::now();
                slot.clone()
            }))
        })
    }

    async fn delete_unbooked_slot(&self, slot_id: Uuid) -> StoreResult<Option<AvailabilitySlot>> {
        self.transaction(|state, _| {
            let deletable = state
                .slots
                .get(&slot_id)
                .map(|slot| slot.status != SlotStatus::Booked && slot.held_by_booking_id.is_none())
                .unwrap_or(false);
            if !deletable {
                return Ok(None);
            }
            state.bookings.retain(|_, booking| booking.slot_id != slot_id);
            Ok(state.slots.remove(&slot_id))
        })
    }

    async fn archive_slots_ended_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.transaction(|state, _| {
            let now = Utc::now();
            let mut archived = 0;
            for slot in state.slots.values_mut() {
                if slot.archived_at.is_none() && slot.end_datetime < cutoff {
                    slot.archived_at = Some(now);
                    slot.updated_at = now;
                    archived += 1;
                }
            }
            Ok(archived)
        })
    }

    async fn reserve_slot(&self, request: ReservationRequest) -> StoreResult<Option<Reservation>> {
        self.transaction(|state, _| {
            let now = request.now;
            let Some(slot) = state.slots.get(&request.slot_id).cloned() else {
                return Ok(None);
            };
            if !slot.is_reservable_at(now) {
                return Ok(None);
            }
            if let Some(other) = overlapping_claim(state, &slot, now) {
                debug!("Slot {} overlaps claimed slot {}", slot.id, other);
                return Ok(None);
            }

            // An expired hold is released as part of taking the slot over.
            if let Some(stale_id) = slot.held_by_booking_id {
                if let Some(stale) = state.bookings.get_mut(&stale_id) {
                    if stale.status == BookingStatus::PendingPayment {
                        stale.status = BookingStatus::Cancelled;
                        stale.updated_at = now;
                    }
                }
            }
            let still_referenced = state
                .bookings
                .values()
                .any(|booking| booking.slot_id == slot.id && booking.is_active());
            if still_referenced {
                return Ok(None);
            }

            let mut booking = Booking {
                id: request.booking_id,
                slot_id: slot.id,
                partner_id: slot.partner_id,
                client_id: request.client_id,
                status: BookingStatus::PendingPayment,
                channel: request.channel,
                amount_due: request.amount_due,
                amount_paid: 0,
                upfront_amount: request.upfront_amount,
                currency: request.currency.clone(),
                order_id: request.order_id.clone(),
                payment_id: None,
                remaining_order_id: None,
                remaining_payment_id: None,
                slot_prior_status: slot.status,
                appointment_id: None,
                expires_at: None,
                created_at: now,
                updated_at: now,
            };
            let mut slot = slot;
            let mut appointment = None;

            match &request.mode {
                ReservationMode::Commit {
                    appointment_id,
                    appointment_title,
                } => {
                    let created = Appointment {
                        id: *appointment_id,
                        partner_id: slot.partner_id,
                        client_id: request.client_id,
                        slot_id: Some(slot.id),
                        title: appointment_title.clone(),
                        start_datetime: slot.start_datetime,
                        end_datetime: slot.end_datetime,
                        status: AppointmentStatus::Scheduled,
                        notes: Some(format!("Booked via availability slot #{}", slot.id)),
                        created_at: now,
                    };
                    booking.status = BookingStatus::Confirmed;
                    booking.appointment_id = Some(created.id);
                    slot.status = SlotStatus::Booked;
                    slot.booked_by_client_id = Some(request.client_id);
                    slot.booked_at = Some(now);
                    slot.appointment_id = Some(created.id);
                    slot.held_by_booking_id = None;
                    slot.hold_expires_at = None;
                    state.appointments.insert(created.id, created.clone());
                    appointment = Some(created);
                }
                ReservationMode::Hold { expires_at } => {
                    booking.expires_at = Some(*expires_at);
                    slot.held_by_booking_id = Some(booking.id);
                    slot.hold_expires_at = Some(*expires_at);
                }
            }
            slot.updated_at = now;

            state.bookings.insert(booking.id, booking.clone());
            state.slots.insert(slot.id, slot.clone());

            Ok(Some(Reservation {
                slot,
                booking,
                appointment,
            }))
        })
    }

    async fn confirm_reservation(
        &self,
        confirmation: PaymentConfirmation,
    ) -> StoreResult<Option<Reservation>> {
        self.transaction(|state, armed| {
            let now = confirmation.now;
            let Some(mut booking) = state.bookings.get(&confirmation.booking_id).cloned() else {
                return Ok(None);
            };
            if booking.status != BookingStatus::PendingPayment {
                return Ok(None);
            }
            let Some(mut slot) = state.slots.get(&booking.slot_id).cloned() else {
                return Ok(None);
            };
            if slot.held_by_booking_id != Some(booking.id) || slot.status == SlotStatus::Booked {
                return Ok(None);
            }
            if let Some(other) = overlapping_claim(state, &slot, now) {
                debug!("Hold on slot {} lost to overlapping slot {}", slot.id, other);
                return Ok(None);
            }

            booking.status = BookingStatus::Confirmed;
            booking.amount_paid = confirmation.amount_paid;
            booking.payment_id = Some(confirmation.payment_id.clone());
            booking.expires_at = None;
            booking.appointment_id = Some(confirmation.appointment_id);
            booking.updated_at = now;
            state.bookings.insert(booking.id, booking.clone());

            checkpoint(armed, FailPoint::ConfirmAfterBookingUpdate)?;

            let appointment = Appointment {
                id: confirmation.appointment_id,
                partner_id: slot.partner_id,
                client_id: booking.client_id,
                slot_id: Some(slot.id),
                title: confirmation.appointment_title.clone(),
                start_datetime: slot.start_datetime,
                end_datetime: slot.end_datetime,
                status: AppointmentStatus::Scheduled,
                notes: Some(format!("Booked via availability slot #{}", slot.id)),
                created_at: now,
            };
            state.appointments.insert(appointment.id, appointment.clone());

            slot.status = SlotStatus::Booked;
            slot.booked_by_client_id = Some(booking.client_id);
            slot.booked_at = Some(now);
            slot.appointment_id = Some(appointment.id);
            slot.held_by_booking_id = None;
            slot.hold_expires_at = None;
            slot.updated_at = now;
            state.slots.insert(slot.id, slot.clone());

            Ok(Some(Reservation {
                slot,
                booking,
                appointment: Some(appointment),
            }))
        })
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        self.read(|state| state.bookings.get(&booking_id).cloned())
    }

    async fn active_booking_for_slot(&self, slot_id: Uuid) -> StoreResult<Option<Booking>> {
        self.read(|state| {
            state
                .bookings
                .values()
                .find(|booking| booking.slot_id == slot_id && booking.is_active())
                .cloned()
        })
    }

    async fn open_remaining_order(
        &self,
        booking_id: Uuid,
        order_id: String,
    ) -> StoreResult<Option<Booking>> {
        self.transaction(|state, _| {
            Ok(state
                .bookings
                .get_mut(&booking_id)
                .filter(|booking| {
                    booking.status == BookingStatus::Confirmed
                        && booking.remaining_payment_id.is_none()
                })
                .map(|booking| {
                    booking.remaining_order_id = Some(order_id);
                    booking.updated_at = Utc::now();
                    booking.clone()
                }))
        })
    }

    async fn record_remaining_payment(
        &self,
        record: RemainingPaymentRecord,
    ) -> StoreResult<Option<Booking>> {
        self.transaction(|state, _| {
            Ok(state
                .bookings
                .get_mut(&record.booking_id)
                .filter(|booking| {
                    booking.status == BookingStatus::Confirmed
                        && booking.remaining_order_id.as_deref() == Some(record.order_id.as_str())
                        && booking.remaining_payment_id.is_none()
                        && !booking.has_recorded_payment(&record.payment_id)
                })
                .map(|booking| {
                    booking.amount_paid = record.amount_paid;
                    booking.remaining_payment_id = Some(record.payment_id);
                    booking.updated_at = record.now;
                    booking.clone()
                }))
        })
    }

    async fn expire_pending_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        self.transaction(|state, _| {
            let expired_ids: Vec<Uuid> = state
                .bookings
                .values()
                .filter(|booking| {
                    booking.status == BookingStatus::PendingPayment
                        && booking.expires_at.map(|at| at <= now).unwrap_or(false)
                })
                .map(|booking| booking.id)
                .collect();

            let mut expired = Vec::with_capacity(expired_ids.len());
            for booking_id in expired_ids {
                let Some(booking) = state.bookings.get_mut(&booking_id) else {
                    continue;
                };
                booking.status = BookingStatus::Cancelled;
                booking.updated_at = now;
                let booking = booking.clone();

                if let Some(slot) = state.slots.get_mut(&booking.slot_id) {
                    if slot.held_by_booking_id == Some(booking.id) {
                        slot.held_by_booking_id = None;
                        slot.hold_expires_at = None;
                        slot.updated_at = now;
                    }
                }
                expired.push(booking);
            }
            Ok(expired)
        })
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> StoreResult<Option<CascadeOutcome>> {
        self.transaction(|state, armed| {
            let now = Utc::now();
            let active = state
                .bookings
                .get(&booking_id)
                .map(|booking| booking.is_active())
                .unwrap_or(false);
            if !active {
                return Ok(None);
            }
            let Some(booking) = state.bookings.remove(&booking_id) else {
                return Ok(None);
            };

            checkpoint(armed, FailPoint::CancelAfterBookingDelete)?;

            let appointment = booking
                .appointment_id
                .and_then(|id| state.appointments.remove(&id));

            let Some(slot) = state.slots.get_mut(&booking.slot_id) else {
                return Err(DatabaseError::Aborted(format!(
                    "booking {} references missing slot {}",
                    booking.id, booking.slot_id
                )));
            };
            reset_slot_after_release(slot, &booking, now);

            Ok(Some(CascadeOutcome {
                slot: slot.clone(),
                booking: Some(booking),
                appointment,
            }))
        })
    }

    async fn delete_slot_cascade(&self, slot_id: Uuid) -> StoreResult<Option<CascadeOutcome>> {
        self.transaction(|state, armed| {
            if !state.slots.contains_key(&slot_id) {
                return Ok(None);
            }

            let active_booking = state
                .bookings
                .values()
                .find(|booking| booking.slot_id == slot_id && booking.is_active())
                .cloned();
            state.bookings.retain(|_, booking| booking.slot_id != slot_id);

            if active_booking.is_some() {
                checkpoint(armed, FailPoint::CascadeAfterBookingDelete)?;
            }

            let appointment_id = active_booking
                .as_ref()
                .and_then(|booking| booking.appointment_id)
                .or_else(|| state.slots.get(&slot_id).and_then(|slot| slot.appointment_id));
            let appointment = appointment_id.and_then(|id| state.appointments.remove(&id));

            let Some(slot) = state.slots.remove(&slot_id) else {
                return Ok(None);
            };

            Ok(Some(CascadeOutcome {
                slot,
                booking: active_booking,
                appointment,
            }))
        })
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        self.transaction(|state, _| {
            let created = Appointment {
                id: Uuid::new_v4(),
                partner_id: appointment.partner_id,
                client_id: appointment.client_id,
                slot_id: appointment.slot_id,
                title: appointment.title,
                start_datetime: appointment.interval.start,
                end_datetime: appointment.interval.end,
                status: AppointmentStatus::Scheduled,
                notes: appointment.notes,
                created_at: Utc::now(),
            };
            state.appointments.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn list_appointments_overlapping(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> StoreResult<Vec<Appointment>> {
        self.read(|state| {
            state
                .appointments
                .values()
                .filter(|apt| apt.partner_id == partner_id)
                .filter(|apt| apt.status != AppointmentStatus::Cancelled)
                .filter(|apt| apt.interval().overlaps(&interval))
                .cloned()
                .collect()
        })
    }

    async fn insert_video_session(&self, session: NewVideoSession) -> StoreResult<VideoSession> {
        self.transaction(|state, _| {
            let now = Utc::now();
            let created = VideoSession {
                id: Uuid::new_v4(),
                partner_id: session.partner_id,
                client_id: session.client_id,
                title: session.title,
                start_datetime: session.interval.start,
                end_datetime: session.interval.end,
                timezone: session.timezone,
                status: VideoSessionStatus::Scheduled,
                therapy_session_id: None,
                appointment_id: session.appointment_id,
                auto_completed: false,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            state.video_sessions.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn get_video_session(&self, session_id: Uuid) -> StoreResult<Option<VideoSession>> {
        self.read(|state| state.video_sessions.get(&session_id).cloned())
    }

    async fn list_video_sessions_overlapping(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> StoreResult<Vec<VideoSession>> {
        self.read(|state| {
            state
                .video_sessions
                .values()
                .filter(|session| session.partner_id == partner_id)
                .filter(|session| session.status != VideoSessionStatus::Cancelled)
                .filter(|session| session.interval().overlaps(&interval))
                .cloned()
                .collect()
        })
    }

    async fn list_stale_video_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<VideoSession>> {
        self.read(|state| {
            let mut stale: Vec<VideoSession> = state
                .video_sessions
                .values()
                .filter(|session| session.status.is_open())
                .filter(|session| session.therapy_session_id.is_none())
                .filter(|session| session.end_datetime < cutoff)
                .cloned()
                .collect();
            stale.sort_by_key(|session| session.end_datetime);
            stale
        })
    }

    async fn transition_video_session(
        &self,
        transition: VideoSessionTransition,
    ) -> StoreResult<Option<VideoSession>> {
        self.transaction(|state, _| {
            let Some(session) = state.video_sessions.get_mut(&transition.session_id) else {
                return Ok(None);
            };
            if !transition.from.contains(&session.status) {
                return Ok(None);
            }
            if transition.require_unlinked && session.therapy_session_id.is_some() {
                return Ok(None);
            }

            session.status = transition.to;
            if let Some(record_id) = transition.therapy_session_id {
                session.therapy_session_id = Some(record_id);
            }
            if transition.to == VideoSessionStatus::Completed {
                session.completed_at = Some(transition.now);
                session.auto_completed = transition.auto_completed;
            }
            session.updated_at = transition.now;
            Ok(Some(session.clone()))
        })
    }

    async fn get_fee_settings(&self, partner_id: Uuid) -> StoreResult<Option<PartnerFeeSettings>> {
        self.read(|state| state.fees.get(&partner_id).cloned())
    }
}
