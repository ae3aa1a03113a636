// libs/availability-cell/src/services/conflict.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_database::SchedulingStore;
use shared_models::scheduling::{AppointmentStatus, TimeInterval, VideoSessionStatus};

use crate::models::{Conflict, ConflictReport, ConflictSource};
use crate::services::calendar::ExternalCalendar;

/// Finds everything overlapping a proposed interval on a provider's schedule.
/// Results are advisory; no source failure is ever fatal.
pub struct ConflictDetector {
    store: Arc<dyn SchedulingStore>,
    calendar: Arc<dyn ExternalCalendar>,
    calendar_timeout: Duration,
}

impl ConflictDetector {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        calendar: Arc<dyn ExternalCalendar>,
        calendar_timeout: Duration,
    ) -> Self {
        Self {
            store,
            calendar,
            calendar_timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn find_conflicts(&self, partner_id: Uuid, interval: TimeInterval) -> ConflictReport {
        let (external, internal) = tokio::join!(
            self.external_conflicts(partner_id, interval),
            self.internal_conflicts(partner_id, interval),
        );

        let mut report = ConflictReport::default();
        match external {
            Some(conflicts) => report.conflicts.extend(conflicts),
            None => report.calendar_unreachable = true,
        }
        match internal {
            Some(conflicts) => report.conflicts.extend(conflicts),
            None => report.store_unreachable = true,
        }
        report.conflicts.sort_by_key(|c| c.start);

        debug!(
            "Conflict check for partner {}: {} conflict(s)",
            partner_id,
            report.conflicts.len()
        );
        report
    }

    async fn external_conflicts(&self, partner_id: Uuid, interval: TimeInterval) -> Option<Vec<Conflict>> {
        let events = match timeout(self.calendar_timeout, self.calendar.list_events(partner_id, interval)).await {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                warn!("External calendar unavailable for partner {}: {}", partner_id, e);
                return None;
            }
            Err(_) => {
                warn!(
                    "External calendar timed out after {:?} for partner {}",
                    self.calendar_timeout, partner_id
                );
                return None;
            }
        };

        Some(
            events
                .into_iter()
                .filter_map(|event| {
                    let span = TimeInterval::new(event.start, event.end)?;
                    span.overlaps(&interval).then(|| Conflict {
                        source: ConflictSource::ExternalCalendar,
                        start: event.start,
                        end: event.end,
                        label: event.summary.unwrap_or_else(|| "Busy".to_string()),
                        reference_id: Some(event.id),
                    })
                })
                .collect(),
        )
    }

    async fn internal_conflicts(&self, partner_id: Uuid, interval: TimeInterval) -> Option<Vec<Conflict>> {
        let (appointments, sessions) = tokio::join!(
            self.store.list_appointments_overlapping(partner_id, interval),
            self.store.list_video_sessions_overlapping(partner_id, interval),
        );

        let appointments = appointments
            .map_err(|e| warn!("Could not read appointments for conflict check: {}", e))
            .ok()?;
        let sessions = sessions
            .map_err(|e| warn!("Could not read video sessions for conflict check: {}", e))
            .ok()?;

        let mut conflicts: Vec<Conflict> = appointments
            .into_iter()
            .filter(|apt| apt.status != AppointmentStatus::Cancelled && apt.interval().overlaps(&interval))
            .map(|apt| Conflict {
                source: ConflictSource::Appointment,
                start: apt.start_datetime,
                end: apt.end_datetime,
                label: apt.title,
                reference_id: Some(apt.id.to_string()),
            })
            .collect();

        conflicts.extend(
            sessions
                .into_iter()
                .filter(|s| s.status != VideoSessionStatus::Cancelled && s.interval().overlaps(&interval))
                .map(|s| Conflict {
                    source: ConflictSource::VideoSession,
                    start: s.start_datetime,
                    end: s.end_datetime,
                    label: s.title,
                    reference_id: Some(s.id.to_string()),
                }),
        );

        Some(conflicts)
    }
}
