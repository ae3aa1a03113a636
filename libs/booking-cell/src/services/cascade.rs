// libs/booking-cell/src/services/cascade.rs
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_database::{CascadeOutcome, SchedulingStore};
use shared_models::auth::Actor;

use crate::models::{BookingError, CascadeResult};

/// Removes a slot or a booking together with everything that hangs off it.
///
/// Both operations run as a single store transaction: either the booking,
/// its appointment and the slot change all land, or none do.
pub struct CascadeDeletionCoordinator {
    store: Arc<dyn SchedulingStore>,
}

impl CascadeDeletionCoordinator {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    fn summarize(outcome: CascadeOutcome, slot_deleted: bool) -> CascadeResult {
        let amount_paid = outcome
            .booking
            .as_ref()
            .map(|booking| booking.amount_paid)
            .unwrap_or(0);
        let appointment_id = outcome
            .appointment
            .as_ref()
            .map(|appointment| appointment.id)
            .or_else(|| outcome.booking.as_ref().and_then(|booking| booking.appointment_id));

        CascadeResult {
            slot_id: outcome.slot.id,
            slot_deleted,
            booking: outcome.booking,
            appointment_id,
            requires_refund_attention: amount_paid > 0,
            amount_paid,
        }
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete_slot(&self, slot_id: Uuid, actor: &Actor) -> Result<CascadeResult, BookingError> {
        let slot = self
            .store
            .get_slot(slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound)?;
        if !actor.can_manage_partner(slot.partner_id) {
            return Err(BookingError::Unauthorized);
        }

        let outcome = self
            .store
            .delete_slot_cascade(slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound)?;
        let result = Self::summarize(outcome, true);

        if result.requires_refund_attention {
            warn!(
                "Deleted slot {} had a paid booking ({} collected); refund required",
                slot_id, result.amount_paid
            );
        }
        info!(
            "Deleted slot {} (booking removed: {}, appointment removed: {})",
            slot_id,
            result.booking.is_some(),
            result.appointment_id.is_some()
        );
        Ok(result)
    }

    /// Cancels a booking and returns its slot to the bookable state it had
    /// before it was reserved.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: &Actor,
    ) -> Result<CascadeResult, BookingError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        if actor.id != booking.client_id && !actor.can_manage_partner(booking.partner_id) {
            return Err(BookingError::Unauthorized);
        }
        if !booking.is_active() {
            return Err(BookingError::InvalidState("booking is already cancelled".to_string()));
        }

        let outcome = self
            .store
            .cancel_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::InvalidState("booking is already cancelled".to_string()))?;
        let result = Self::summarize(outcome, false);

        if result.requires_refund_attention {
            warn!(
                "Cancelled booking {} had {} collected; refund required",
                booking_id, result.amount_paid
            );
        }
        info!("Cancelled booking {}; slot {} is bookable again", booking_id, result.slot_id);
        Ok(result)
    }
}
