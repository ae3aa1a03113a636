// libs/shared/database/src/postgrest.rs
//! `SchedulingStore` backed by Supabase PostgREST.
//!
//! Single-row compare-and-set writes are conditional `PATCH`/`DELETE`
//! requests whose filters carry the precondition; an empty representation
//! means the precondition failed. Multi-row operations call the Postgres
//! functions in `migrations/0001_scheduling.sql`, each running in one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::scheduling::{
    Appointment, AvailabilitySlot, Booking, NewAppointment, NewSlot, NewVideoSession,
    PartnerFeeSettings, TimeInterval, VideoSession, VideoSessionStatus,
};

use crate::error::DatabaseError;
use crate::store::{
    CascadeOutcome, PaymentConfirmation, RemainingPaymentRecord, Reservation, ReservationRequest,
    SchedulingStore, SlotQuery, StoreResult, VideoSessionTransition,
};
use crate::supabase::SupabaseClient;

const SLOTS: &str = "/rest/v1/availability_slots";
const BOOKINGS: &str = "/rest/v1/slot_bookings";
const APPOINTMENTS: &str = "/rest/v1/appointments";
const VIDEO_SESSIONS: &str = "/rest/v1/video_sessions";
const FEE_SETTINGS: &str = "/rest/v1/partner_fee_settings";

pub struct SupabaseSchedulingStore {
    supabase: SupabaseClient,
}

fn ts(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339()).into_owned()
}

fn overlap_filter(interval: &TimeInterval) -> String {
    format!(
        "start_datetime=lt.{}&end_datetime=gt.{}",
        ts(interval.end),
        ts(interval.start)
    )
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DatabaseError::from))
        .collect()
}

fn first_row<T: DeserializeOwned>(rows: Vec<Value>) -> StoreResult<Option<T>> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

fn status_list(statuses: &[VideoSessionStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl SupabaseSchedulingStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }

    pub fn from_client(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    fn token(&self) -> Option<&str> {
        Some(self.supabase.api_key())
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Vec<T>> {
        self.supabase
            .request::<Vec<T>>(Method::GET, path, self.token(), None)
            .await
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        Ok(self.select::<T>(path).await?.into_iter().next())
    }

    async fn write_returning(&self, method: Method, path: &str, body: Option<Value>) -> StoreResult<Vec<Value>> {
        self.supabase
            .request_returning(method, path, self.token(), body)
            .await
    }

    async fn insert_row<T: DeserializeOwned>(&self, table: &str, body: Value) -> StoreResult<T> {
        let rows = self.write_returning(Method::POST, table, Some(body)).await?;
        first_row(rows)?.ok_or_else(|| DatabaseError::Decode(format!("insert into {} returned no row", table)))
    }
}

#[async_trait]
impl SchedulingStore for SupabaseSchedulingStore {
    #[instrument(skip(self, slot), fields(partner_id = %slot.partner_id))]
    async fn insert_slot(&self, slot: NewSlot) -> StoreResult<AvailabilitySlot> {
        let body = json!({
            "partner_id": slot.partner_id,
            "start_datetime": slot.interval.start,
            "end_datetime": slot.interval.end,
            "timezone": slot.timezone,
            "status": slot.status,
            "is_published": false,
        });
        self.insert_row(SLOTS, body).await
    }

    async fn get_slot(&self, slot_id: Uuid) -> StoreResult<Option<AvailabilitySlot>> {
        let path = format!("{}?id=eq.{}&archived_at=is.null", SLOTS, slot_id);
        self.select_one(&path).await
    }

    async fn list_slots(&self, query: SlotQuery) -> StoreResult<Vec<AvailabilitySlot>> {
        let mut path = format!(
            "{}?partner_id=eq.{}&archived_at=is.null&order=start_datetime.asc",
            SLOTS, query.partner_id
        );
        if query.published_only {
            path.push_str("&is_published=eq.true");
        }
        if let Some(window) = query.window {
            path.push('&');
            path.push_str(&overlap_filter(&window));
        }
        self.select(&path).await
    }

    #[instrument(skip(self, slot_ids))]
    async fn publish_slots(
        &self,
        partner_id: Uuid,
        slot_ids: Option<Vec<Uuid>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AvailabilitySlot>> {
        let mut path = format!(
            "{}?partner_id=eq.{}&is_published=eq.false&status=neq.booked&archived_at=is.null",
            SLOTS, partner_id
        );
        if let Some(ids) = slot_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let ids = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
            path.push_str(&format!("&id=in.({})", ids));
        }

        let body = json!({
            "is_published": true,
            "last_published_at": now,
            "updated_at": now,
        });
        let rows = self.write_returning(Method::PATCH, &path, Some(body)).await?;
        decode_rows(rows)
    }

    async fn record_slot_conflicts(
        &self,
        slot_id: Uuid,
        has_conflict: bool,
        details: Option<Value>,
    ) -> StoreResult<Option<AvailabilitySlot>> {
        let path = format!("{}?id=eq.{}", SLOTS, slot_id);
        let body = json!({
            "has_external_conflict": has_conflict,
            "conflict_details": details,
            "updated_at": Utc::now(),
        });
        let rows = self.write_returning(Method::PATCH, &path, Some(body)).await?;
        first_row(rows)
    }

    async fn delete_unbooked_slot(&self, slot_id: Uuid) -> StoreResult<Option<AvailabilitySlot>> {
        let path = format!(
            "{}?id=eq.{}&status=neq.booked&held_by_booking_id=is.null",
            SLOTS, slot_id
        );
        let rows = self.write_returning(Method::DELETE, &path, None).await?;
        first_row(rows)
    }

    async fn archive_slots_ended_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let path = format!(
            "{}?archived_at=is.null&end_datetime=lt.{}&select=id",
            SLOTS,
            ts(cutoff)
        );
        let now = Utc::now();
        let body = json!({ "archived_at": now, "updated_at": now });
        let rows = self.write_returning(Method::PATCH, &path, Some(body)).await?;
        Ok(rows.len() as u64)
    }

    #[instrument(skip(self, request), fields(slot_id = %request.slot_id, booking_id = %request.booking_id))]
    async fn reserve_slot(&self, request: ReservationRequest) -> StoreResult<Option<Reservation>> {
        let args = json!({ "p_request": serde_json::to_value(&request)? });
        let reservation: Option<Reservation> =
            self.supabase.rpc("reserve_slot", self.token(), args).await?;
        if reservation.is_none() {
            debug!("reserve_slot precondition failed for slot {}", request.slot_id);
        }
        Ok(reservation)
    }

    #[instrument(skip(self, confirmation), fields(booking_id = %confirmation.booking_id))]
    async fn confirm_reservation(
        &self,
        confirmation: PaymentConfirmation,
    ) -> StoreResult<Option<Reservation>> {
        let args = json!({ "p_confirmation": serde_json::to_value(&confirmation)? });
        self.supabase.rpc("confirm_booking", self.token(), args).await
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let path = format!("{}?id=eq.{}", BOOKINGS, booking_id);
        self.select_one(&path).await
    }

    async fn active_booking_for_slot(&self, slot_id: Uuid) -> StoreResult<Option<Booking>> {
        let path = format!("{}?slot_id=eq.{}&status=neq.cancelled&limit=1", BOOKINGS, slot_id);
        self.select_one(&path).await
    }

    async fn open_remaining_order(
        &self,
        booking_id: Uuid,
        order_id: String,
    ) -> StoreResult<Option<Booking>> {
        let path = format!(
            "{}?id=eq.{}&status=eq.confirmed&remaining_payment_id=is.null",
            BOOKINGS, booking_id
        );
        let body = json!({ "remaining_order_id": order_id, "updated_at": Utc::now() });
        let rows = self.write_returning(Method::PATCH, &path, Some(body)).await?;
        first_row(rows)
    }

    #[instrument(skip(self, record), fields(booking_id = %record.booking_id))]
    async fn record_remaining_payment(
        &self,
        record: RemainingPaymentRecord,
    ) -> StoreResult<Option<Booking>> {
        let path = format!(
            "{}?id=eq.{}&status=eq.confirmed&remaining_order_id=eq.{}&remaining_payment_id=is.null",
            BOOKINGS,
            record.booking_id,
            urlencoding::encode(&record.order_id)
        );
        let body = json!({
            "amount_paid": record.amount_paid,
            "remaining_payment_id": record.payment_id,
            "updated_at": record.now,
        });
        let rows = self.write_returning(Method::PATCH, &path, Some(body)).await?;
        first_row(rows)
    }

    async fn expire_pending_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let expired: Option<Vec<Booking>> = self
            .supabase
            .rpc("expire_pending_bookings", self.token(), json!({ "p_now": now }))
            .await?;
        Ok(expired.unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn cancel_booking(&self, booking_id: Uuid) -> StoreResult<Option<CascadeOutcome>> {
        self.supabase
            .rpc("cancel_booking", self.token(), json!({ "p_booking_id": booking_id }))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_slot_cascade(&self, slot_id: Uuid) -> StoreResult<Option<CascadeOutcome>> {
        self.supabase
            .rpc("delete_slot_cascade", self.token(), json!({ "p_slot_id": slot_id }))
            .await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        let body = json!({
            "partner_id": appointment.partner_id,
            "client_id": appointment.client_id,
            "slot_id": appointment.slot_id,
            "title": appointment.title,
            "start_datetime": appointment.interval.start,
            "end_datetime": appointment.interval.end,
            "status": "scheduled",
            "notes": appointment.notes,
        });
        self.insert_row(APPOINTMENTS, body).await
    }

    async fn list_appointments_overlapping(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "{}?partner_id=eq.{}&status=neq.cancelled&{}",
            APPOINTMENTS,
            partner_id,
            overlap_filter(&interval)
        );
        self.select(&path).await
    }

    async fn insert_video_session(&self, session: NewVideoSession) -> StoreResult<VideoSession> {
        let body = json!({
            "partner_id": session.partner_id,
            "client_id": session.client_id,
            "title": session.title,
            "start_datetime": session.interval.start,
            "end_datetime": session.interval.end,
            "timezone": session.timezone,
            "status": VideoSessionStatus::Scheduled,
            "appointment_id": session.appointment_id,
        });
        self.insert_row(VIDEO_SESSIONS, body).await
    }

    async fn get_video_session(&self, session_id: Uuid) -> StoreResult<Option<VideoSession>> {
        let path = format!("{}?id=eq.{}", VIDEO_SESSIONS, session_id);
        self.select_one(&path).await
    }

    async fn list_video_sessions_overlapping(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> StoreResult<Vec<VideoSession>> {
        let path = format!(
            "{}?partner_id=eq.{}&status=neq.cancelled&{}",
            VIDEO_SESSIONS,
            partner_id,
            overlap_filter(&interval)
        );
        self.select(&path).await
    }

    async fn list_stale_video_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<VideoSession>> {
        let path = format!(
            "{}?status=in.(scheduled,in_progress)&therapy_session_id=is.null&end_datetime=lt.{}&order=end_datetime.asc",
            VIDEO_SESSIONS,
            ts(cutoff)
        );
        self.select(&path).await
    }

    #[instrument(skip(self, transition), fields(session_id = %transition.session_id, to = %transition.to))]
    async fn transition_video_session(
        &self,
        transition: VideoSessionTransition,
    ) -> StoreResult<Option<VideoSession>> {
        if transition.from.is_empty() {
            return Ok(None);
        }

        let mut path = format!(
            "{}?id=eq.{}&status=in.({})",
            VIDEO_SESSIONS,
            transition.session_id,
            status_list(&transition.from)
        );
        if transition.require_unlinked {
            path.push_str("&therapy_session_id=is.null");
        }

        let mut body = json!({
            "status": transition.to,
            "updated_at": transition.now,
        });
        if let Some(record_id) = transition.therapy_session_id {
            body["therapy_session_id"] = json!(record_id);
        }
        if transition.to == VideoSessionStatus::Completed {
            body["completed_at"] = json!(transition.now);
            body["auto_completed"] = json!(transition.auto_completed);
        }

        let rows = self.write_returning(Method::PATCH, &path, Some(body)).await?;
        first_row(rows)
    }

    async fn get_fee_settings(&self, partner_id: Uuid) -> StoreResult<Option<PartnerFeeSettings>> {
        let path = format!("{}?partner_id=eq.{}", FEE_SETTINGS, partner_id);
        self.select_one(&path).await
    }
}
