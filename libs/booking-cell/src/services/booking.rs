// libs/booking-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_database::{
    PaymentConfirmation, RemainingPaymentRecord, ReservationMode, ReservationRequest,
    SchedulingStore, SlotQuery,
};
use shared_models::auth::Actor;
use shared_models::scheduling::{
    AvailabilitySlot, Booking, BookingChannel, BookingStatus, LocationType, PartnerFeeSettings,
};
use shared_utils::sweep::SweepTask;

use crate::models::{BookingError, BookingResult, PaymentEvidence, RemainingPayment};
use crate::services::payment::{OrderHandle, OrderRequest, PaymentGateway};

const DEFAULT_CURRENCY: &str = "INR";

/// Turns a published slot into a confirmed booking.
///
/// The slot is claimed by a single compare-and-set in the store, so two
/// clients racing for the same slot can never both win. When money is due
/// upfront the slot is held for the booking while the client pays; the
/// appointment only exists once the payment has been verified.
pub struct BookingService {
    store: Arc<dyn SchedulingStore>,
    gateway: Arc<dyn PaymentGateway>,
    payment_timeout: Duration,
    hold_ttl: chrono::Duration,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        gateway: Arc<dyn PaymentGateway>,
        payment_timeout: Duration,
        hold_ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            payment_timeout,
            hold_ttl,
        }
    }

    fn appointment_title(slot: &AvailabilitySlot) -> String {
        slot.status
            .location_type()
            .unwrap_or(LocationType::Online)
            .appointment_title()
            .to_string()
    }

    async fn fee_settings(&self, partner_id: Uuid) -> Result<PartnerFeeSettings, BookingError> {
        let settings = self.store.get_fee_settings(partner_id).await?;
        Ok(settings.unwrap_or_else(|| PartnerFeeSettings {
            partner_id,
            session_fee: None,
            booking_fee: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }))
    }

    async fn create_order(&self, request: OrderRequest) -> Result<OrderHandle, BookingError> {
        match timeout(self.payment_timeout, self.gateway.create_order(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BookingError::PaymentGateway(format!(
                "order creation timed out after {:?}",
                self.payment_timeout
            ))),
        }
    }

    async fn verify(&self, order_id: &str, evidence: &PaymentEvidence) -> Result<(), BookingError> {
        let verification = timeout(self.payment_timeout, self.gateway.verify_payment(order_id, evidence))
            .await
            .map_err(|_| {
                warn!("Payment verification for order {} timed out", order_id);
                BookingError::PaymentVerificationTimeout
            })??;

        if verification.verified {
            Ok(())
        } else {
            Err(BookingError::PaymentVerificationFailed)
        }
    }

    /// Re-reads `slot` and the partner's overlapping slots. Only a hint: the
    /// reservation itself is decided by the store.
    async fn still_claimable(&self, slot: &AvailabilitySlot) -> Result<bool, BookingError> {
        let now = Utc::now();
        let current = self.store.get_slot(slot.id).await?;
        if !current.map(|s| s.is_reservable_at(now)).unwrap_or(false) {
            return Ok(false);
        }
        let neighbours = self
            .store
            .list_slots(SlotQuery {
                partner_id: slot.partner_id,
                window: Some(slot.interval()),
                published_only: false,
            })
            .await?;
        Ok(!neighbours
            .iter()
            .any(|other| other.id != slot.id && other.is_claimed_at(now)))
    }

    /// Attempts to book `slot_id` for `client_id`.
    ///
    /// With nothing to collect upfront the booking, appointment and slot update
    /// commit together. Otherwise a gateway order is opened and the slot is
    /// held until the payment is confirmed or the hold expires.
    #[instrument(skip(self), fields(slot_id = %slot_id, client_id = %client_id))]
    pub async fn attempt(
        &self,
        slot_id: Uuid,
        client_id: Uuid,
        channel: BookingChannel,
    ) -> Result<BookingResult, BookingError> {
        let now = Utc::now();
        let slot = self
            .store
            .get_slot(slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound)?;

        if !slot.is_reservable_at(now) {
            debug!("Slot {} is not reservable (status {})", slot_id, slot.status);
            return Err(BookingError::slot_taken("slot is no longer available"));
        }

        let fees = self.fee_settings(slot.partner_id).await?;
        let upfront = fees.upfront_for(channel);
        let amount_due = fees.total_due_for(channel);
        let booking_id = Uuid::new_v4();

        let mut request = ReservationRequest {
            slot_id,
            booking_id,
            client_id,
            channel,
            amount_due,
            upfront_amount: upfront,
            currency: fees.currency.clone(),
            order_id: None,
            mode: ReservationMode::Commit {
                appointment_id: Uuid::new_v4(),
                appointment_title: Self::appointment_title(&slot),
            },
            now,
        };

        let order = if upfront > 0 {
            // Orders cannot be withdrawn, so skip opening one when the slot
            // or the partner's time was claimed in the meantime.
            if !self.still_claimable(&slot).await? {
                return Err(BookingError::slot_taken("slot is no longer available"));
            }

            let order = self
                .create_order(OrderRequest {
                    amount: upfront,
                    currency: fees.currency.clone(),
                    receipt: format!("booking_{}_{}", slot_id, now.timestamp()),
                    notes: json!({
                        "partner_id": slot.partner_id,
                        "slot_id": slot_id,
                        "client_id": client_id,
                        "payment_type": match channel {
                            BookingChannel::Public => "session_fee",
                            BookingChannel::Client => "booking_fee",
                        },
                    }),
                })
                .await?;
            request.order_id = Some(order.id.clone());
            request.mode = ReservationMode::Hold {
                expires_at: now + self.hold_ttl,
            };
            Some(order)
        } else {
            None
        };

        let Some(reservation) = self.store.reserve_slot(request).await? else {
            if let Some(order) = &order {
                warn!("Slot {} taken after order {} was opened; order left unused", slot_id, order.id);
            }
            return Err(BookingError::slot_taken(
                "slot or an overlapping slot was booked by someone else",
            ));
        };

        match &reservation.appointment {
            Some(appointment) => info!(
                "Booked slot {} for client {} (appointment {})",
                slot_id, client_id, appointment.id
            ),
            None => info!(
                "Held slot {} for client {} pending payment of {} {}",
                slot_id, client_id, upfront, fees.currency
            ),
        }

        Ok(BookingResult {
            booking: reservation.booking,
            slot: reservation.slot,
            appointment: reservation.appointment,
            order,
            channel,
        })
    }

    /// Verifies the upfront payment and converts the hold into a booking.
    ///
    /// A verified payment whose hold was lost is reported with
    /// `requires_refund_attention` set; the money has already moved.
    #[instrument(skip(self, evidence), fields(booking_id = %booking_id))]
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        evidence: PaymentEvidence,
    ) -> Result<BookingResult, BookingError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if booking.status == BookingStatus::Confirmed {
            return Err(BookingError::InvalidState("booking is already confirmed".to_string()));
        }
        if booking.has_recorded_payment(&evidence.payment_id) {
            return Err(BookingError::InvalidState("payment was already recorded".to_string()));
        }
        let order_id = booking
            .order_id
            .clone()
            .ok_or_else(|| BookingError::InvalidState("booking has no payment order".to_string()))?;

        self.verify(&order_id, &evidence).await?;

        if booking.status == BookingStatus::Cancelled {
            error!(
                "Payment {} verified for cancelled booking {}; refund required",
                evidence.payment_id, booking_id
            );
            return Err(BookingError::slot_lost_after_payment(
                "the hold on this slot expired before payment was confirmed",
            ));
        }

        let slot = self
            .store
            .get_slot(booking.slot_id)
            .await?
            .ok_or_else(|| BookingError::slot_lost_after_payment("slot was removed"))?;

        let confirmed = self
            .store
            .confirm_reservation(PaymentConfirmation {
                booking_id,
                appointment_id: Uuid::new_v4(),
                appointment_title: Self::appointment_title(&slot),
                amount_paid: booking.amount_paid + booking.upfront_amount,
                payment_id: evidence.payment_id.clone(),
                now: Utc::now(),
            })
            .await?;

        let Some(reservation) = confirmed else {
            error!(
                "Payment {} verified but slot {} was lost; refund required",
                evidence.payment_id, booking.slot_id
            );
            return Err(BookingError::slot_lost_after_payment(
                "slot was taken before payment was confirmed",
            ));
        };

        info!("Confirmed booking {} on slot {}", booking_id, booking.slot_id);
        Ok(BookingResult {
            channel: reservation.booking.channel,
            booking: reservation.booking,
            slot: reservation.slot,
            appointment: reservation.appointment,
            order: None,
        })
    }

    fn authorize_view(actor: &Actor, booking: &Booking) -> Result<(), BookingError> {
        if actor.id == booking.client_id || actor.can_manage_partner(booking.partner_id) {
            Ok(())
        } else {
            Err(BookingError::Unauthorized)
        }
    }

    pub async fn get_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        Self::authorize_view(actor, &booking)?;
        Ok(booking)
    }

    /// Opens an order for what is still owed on a confirmed booking.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn pay_remaining(
        &self,
        actor: &Actor,
        booking_id: Uuid,
    ) -> Result<RemainingPayment, BookingError> {
        let booking = self.get_booking(actor, booking_id).await?;
        if actor.id != booking.client_id && !actor.is_privileged() {
            return Err(BookingError::Unauthorized);
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::InvalidState(format!(
                "booking is {}, not confirmed",
                booking.status
            )));
        }

        let amount = booking.outstanding();
        if amount == 0 {
            return Err(BookingError::NothingToPay);
        }

        let order = self
            .create_order(OrderRequest {
                amount,
                currency: booking.currency.clone(),
                receipt: format!("remaining_{}_{}", booking.slot_id, Utc::now().timestamp()),
                notes: json!({
                    "partner_id": booking.partner_id,
                    "slot_id": booking.slot_id,
                    "booking_id": booking.id,
                    "payment_type": "remaining_payment",
                }),
            })
            .await?;

        let booking = self
            .store
            .open_remaining_order(booking_id, order.id.clone())
            .await?
            .ok_or_else(|| BookingError::InvalidState("balance was already settled".to_string()))?;
        debug!("Opened remaining-payment order {} for booking {}", order.id, booking_id);

        Ok(RemainingPayment {
            booking,
            order,
            amount,
        })
    }

    /// Verifies the remaining payment and marks the booking fully paid.
    #[instrument(skip(self, actor, evidence), fields(actor_id = %actor.id))]
    pub async fn confirm_remaining(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        evidence: PaymentEvidence,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(actor, booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::InvalidState(format!(
                "booking is {}, not confirmed",
                booking.status
            )));
        }
        if booking.outstanding() == 0 {
            return Err(BookingError::NothingToPay);
        }
        let order_id = booking.remaining_order_id.clone().ok_or_else(|| {
            BookingError::InvalidState("no remaining-payment order is open".to_string())
        })?;
        if booking.has_recorded_payment(&evidence.payment_id) {
            return Err(BookingError::InvalidState("payment was already recorded".to_string()));
        }

        self.verify(&order_id, &evidence).await?;

        let updated = self
            .store
            .record_remaining_payment(RemainingPaymentRecord {
                booking_id,
                order_id,
                payment_id: evidence.payment_id.clone(),
                amount_paid: booking.amount_due,
                now: Utc::now(),
            })
            .await?
            .ok_or_else(|| {
                BookingError::InvalidState("remaining payment was already recorded".to_string())
            })?;
        info!("Booking {} fully paid", booking_id);
        Ok(updated)
    }

    /// Cancels pending bookings whose hold lapsed and frees their slots.
    pub async fn expire_pending(&self) -> Result<Vec<Booking>, BookingError> {
        let expired = self.store.expire_pending_bookings(Utc::now()).await?;
        for booking in &expired {
            debug!("Released expired hold of booking {} on slot {}", booking.id, booking.slot_id);
        }
        Ok(expired)
    }
}

/// Periodically releases holds whose payment never arrived.
pub struct ExpirePendingBookingsSweep {
    bookings: Arc<BookingService>,
}

impl ExpirePendingBookingsSweep {
    pub fn new(bookings: Arc<BookingService>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl SweepTask for ExpirePendingBookingsSweep {
    fn name(&self) -> &'static str {
        "expire-pending-bookings"
    }

    async fn run_once(&self) -> anyhow::Result<usize> {
        let expired = self.bookings.expire_pending().await?;
        Ok(expired.len())
    }
}
