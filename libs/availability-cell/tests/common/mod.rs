#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use availability_cell::{
    CalendarError, ConflictDetector, ExternalCalendar, ExternalCalendarEvent, SlotService,
};
use shared_database::{InMemorySchedulingStore, SchedulingStore};
use shared_models::scheduling::TimeInterval;

pub enum CalendarBehaviour {
    Events(Vec<ExternalCalendarEvent>),
    Fail,
    Hang,
}

pub struct FakeCalendar {
    pub behaviour: CalendarBehaviour,
}

impl FakeCalendar {
    pub fn empty() -> Self {
        Self { behaviour: CalendarBehaviour::Events(Vec::new()) }
    }

    pub fn with_events(events: Vec<ExternalCalendarEvent>) -> Self {
        Self { behaviour: CalendarBehaviour::Events(events) }
    }
}

#[async_trait]
impl ExternalCalendar for FakeCalendar {
    async fn list_events(
        &self,
        _partner_id: Uuid,
        _interval: TimeInterval,
    ) -> Result<Vec<ExternalCalendarEvent>, CalendarError> {
        match &self.behaviour {
            CalendarBehaviour::Events(events) => Ok(events.clone()),
            CalendarBehaviour::Fail => Err(CalendarError::Api {
                status: 401,
                message: "invalid credentials".to_string(),
            }),
            CalendarBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn utc(date: (i32, u32, u32), hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(date.0, date.1, date.2, hour, minute, 0).unwrap()
}

pub fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ExternalCalendarEvent {
    ExternalCalendarEvent {
        id: id.to_string(),
        summary: Some(format!("Event {}", id)),
        start,
        end,
    }
}

pub struct Harness {
    pub store: Arc<InMemorySchedulingStore>,
    pub detector: Arc<ConflictDetector>,
    pub slots: SlotService,
}

pub fn harness(calendar: FakeCalendar) -> Harness {
    let store = Arc::new(InMemorySchedulingStore::new());
    let dyn_store: Arc<dyn SchedulingStore> = store.clone();
    let detector = Arc::new(ConflictDetector::new(
        dyn_store.clone(),
        Arc::new(calendar),
        Duration::from_millis(100),
    ));
    let slots = SlotService::new(dyn_store, detector.clone());
    Harness { store, detector, slots }
}
