// libs/availability-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{SchedulingStore, SlotQuery};
use shared_models::auth::Actor;
use shared_models::scheduling::{AvailabilitySlot, NewSlot, SlotStatus, TimeInterval};

use crate::models::{
    AvailabilityError, ConflictReport, CreateSlotRequest, CreatedSlot, LocalSlotView,
    PublishSlotsResponse, SlotWindowQuery,
};
use crate::services::conflict::ConflictDetector;
use crate::services::time;

const DEFAULT_LISTING_DAYS: i64 = 7;

/// Creation, publication, replacement and listing of availability slots.
/// Deleting booked slots goes through the booking cascade instead.
pub struct SlotService {
    store: Arc<dyn SchedulingStore>,
    detector: Arc<ConflictDetector>,
}

impl SlotService {
    pub fn new(store: Arc<dyn SchedulingStore>, detector: Arc<ConflictDetector>) -> Self {
        Self { store, detector }
    }

    fn authorize(actor: &Actor, partner_id: Uuid) -> Result<(), AvailabilityError> {
        if actor.can_manage_partner(partner_id) {
            Ok(())
        } else {
            Err(AvailabilityError::Unauthorized)
        }
    }

    fn resolve_window(query: &SlotWindowQuery, now: DateTime<Utc>) -> Result<TimeInterval, AvailabilityError> {
        let from = query.from.unwrap_or(now);
        let to = query.to.unwrap_or(from + Duration::days(DEFAULT_LISTING_DAYS));
        TimeInterval::new(from, to)
            .ok_or_else(|| AvailabilityError::InvalidTimeRange("window start must be before its end".to_string()))
    }

    /// Normalizes and validates a request without touching the store.
    pub fn normalize(request: &CreateSlotRequest) -> Result<TimeInterval, AvailabilityError> {
        if request.status == SlotStatus::Booked {
            return Err(AvailabilityError::InvalidStatus(
                "slots cannot be created as booked".to_string(),
            ));
        }
        time::parse_timezone(&request.timezone)?;
        time::to_utc_interval(&request.date, &request.start_time, &request.end_time, &request.timezone)
    }

    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn create_slot(
        &self,
        actor: &Actor,
        partner_id: Uuid,
        request: CreateSlotRequest,
    ) -> Result<CreatedSlot, AvailabilityError> {
        Self::authorize(actor, partner_id)?;
        let interval = Self::normalize(&request)?;

        let slot = self
            .store
            .insert_slot(NewSlot {
                partner_id,
                interval,
                timezone: request.timezone.trim().to_string(),
                status: request.status,
            })
            .await?;
        info!("Created slot {} for partner {}", slot.id, partner_id);

        let report = self.detector.find_conflicts(partner_id, interval).await;
        let slot = self.record_conflicts(slot, &report).await;

        Ok(CreatedSlot {
            slot,
            conflict_warning: report.needs_attention().then_some(report),
        })
    }

    /// Stores the conflict snapshot on the slot. The slot already exists, so a
    /// failure here is logged and the unannotated slot returned.
    async fn record_conflicts(&self, slot: AvailabilitySlot, report: &ConflictReport) -> AvailabilitySlot {
        if !report.has_conflicts() {
            return slot;
        }

        let details = json!({
            "conflicts": report.conflicts,
            "calendar_unreachable": report.calendar_unreachable,
            "checked_at": Utc::now(),
        });

        match self
            .store
            .record_slot_conflicts(slot.id, report.has_external_conflict(), Some(details))
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                warn!("Slot {} disappeared before conflicts were recorded", slot.id);
                slot
            }
            Err(e) => {
                warn!("Failed to record conflicts for slot {}: {}", slot.id, e);
                slot
            }
        }
    }

    #[instrument(skip(self, actor, slot_ids), fields(actor_id = %actor.id))]
    pub async fn publish(
        &self,
        actor: &Actor,
        partner_id: Uuid,
        slot_ids: Option<Vec<Uuid>>,
    ) -> Result<PublishSlotsResponse, AvailabilityError> {
        Self::authorize(actor, partner_id)?;

        let slots = self.store.publish_slots(partner_id, slot_ids, Utc::now()).await?;
        info!("Published {} slot(s) for partner {}", slots.len(), partner_id);

        Ok(PublishSlotsResponse {
            published: slots.len(),
            slots,
        })
    }

    /// Edits a slot by deleting it and creating the replacement unpublished.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn replace(
        &self,
        actor: &Actor,
        slot_id: Uuid,
        request: CreateSlotRequest,
    ) -> Result<CreatedSlot, AvailabilityError> {
        let existing = self
            .store
            .get_slot(slot_id)
            .await?
            .ok_or(AvailabilityError::SlotNotFound)?;
        Self::authorize(actor, existing.partner_id)?;

        // Validate before deleting so a bad request leaves the old slot alone.
        Self::normalize(&request)?;

        if existing.status == SlotStatus::Booked || existing.held_by_booking_id.is_some() {
            return Err(AvailabilityError::SlotUnavailable(
                "booked or held slots cannot be edited".to_string(),
            ));
        }

        if self.store.delete_unbooked_slot(slot_id).await?.is_none() {
            info!("Slot {} was reserved while being edited", slot_id);
            return Err(AvailabilityError::SlotUnavailable(
                "slot was reserved while being edited".to_string(),
            ));
        }
        debug!("Deleted slot {} for replacement", slot_id);

        self.create_slot(actor, existing.partner_id, request).await
    }

    /// Partner view: every slot in the window, published or not.
    pub async fn list_for_partner(
        &self,
        actor: &Actor,
        partner_id: Uuid,
        query: SlotWindowQuery,
    ) -> Result<Vec<LocalSlotView>, AvailabilityError> {
        Self::authorize(actor, partner_id)?;
        let window = Self::resolve_window(&query, Utc::now())?;

        let slots = self
            .store
            .list_slots(SlotQuery {
                partner_id,
                window: Some(window),
                published_only: false,
            })
            .await?;
        Ok(slots.into_iter().filter_map(localize).collect())
    }

    /// Client view: published slots still open for booking.
    pub async fn list_published(
        &self,
        partner_id: Uuid,
        query: SlotWindowQuery,
    ) -> Result<Vec<LocalSlotView>, AvailabilityError> {
        let now = Utc::now();
        let window = Self::resolve_window(&query, now)?;

        let slots = self
            .store
            .list_slots(SlotQuery {
                partner_id,
                window: Some(window),
                published_only: true,
            })
            .await?;

        Ok(slots
            .into_iter()
            .filter(|slot| slot.is_reservable_at(now))
            .filter_map(localize)
            .collect())
    }

    pub async fn check_conflicts(
        &self,
        actor: &Actor,
        partner_id: Uuid,
        request: &CreateSlotRequest,
    ) -> Result<ConflictReport, AvailabilityError> {
        Self::authorize(actor, partner_id)?;
        let interval = Self::normalize(request)?;
        Ok(self.detector.find_conflicts(partner_id, interval).await)
    }
}

fn localize(slot: AvailabilitySlot) -> Option<LocalSlotView> {
    let (local_date, local_start_time) = time::format_local(slot.start_datetime, &slot.timezone)
        .map_err(|e| warn!("Slot {} has an unusable timezone: {}", slot.id, e))
        .ok()?;
    let (_, local_end_time) = time::format_local(slot.end_datetime, &slot.timezone).ok()?;

    Some(LocalSlotView {
        slot,
        local_date,
        local_start_time,
        local_end_time,
    })
}
