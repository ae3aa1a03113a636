#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use availability_cell::{ConflictDetector, NoExternalCalendar};
use session_cell::{MaterializeError, SessionLifecycleManager, SessionRecordMaterializer};
use shared_database::{InMemorySchedulingStore, SchedulingStore};
use shared_models::scheduling::{NewVideoSession, SessionRecord, TimeInterval, VideoSession};

/// Behaves like the `therapy_sessions` table: one record per video session,
/// a second insert reports the existing one.
#[derive(Default)]
pub struct FakeMaterializer {
    records: Mutex<HashMap<Uuid, SessionRecord>>,
    pub unavailable: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeMaterializer {
    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn record_for(&self, video_session_id: Uuid) -> Option<SessionRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|r| r.get(&video_session_id).cloned())
    }
}

#[async_trait]
impl SessionRecordMaterializer for FakeMaterializer {
    async fn create_from_video_session(
        &self,
        session: &VideoSession,
    ) -> Result<SessionRecord, MaterializeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent sweeps interleave
        tokio::task::yield_now().await;

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MaterializeError::Unavailable("notes service down".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.get(&session.id) {
            return Err(MaterializeError::AlreadyExists {
                existing: Some(existing.clone()),
            });
        }
        let record = SessionRecord {
            id: Uuid::new_v4(),
            video_session_id: session.id,
        };
        records.insert(session.id, record.clone());
        Ok(record)
    }
}

pub struct Harness {
    pub store: Arc<InMemorySchedulingStore>,
    pub materializer: Arc<FakeMaterializer>,
    pub sessions: Arc<SessionLifecycleManager>,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemorySchedulingStore::new());
    let materializer = Arc::new(FakeMaterializer::default());
    let dyn_store: Arc<dyn SchedulingStore> = store.clone();
    let detector = Arc::new(ConflictDetector::new(
        dyn_store.clone(),
        Arc::new(NoExternalCalendar),
        Duration::from_millis(100),
    ));
    let sessions = Arc::new(SessionLifecycleManager::new(
        dyn_store,
        detector,
        materializer.clone(),
        chrono::Duration::hours(24),
    ));
    Harness {
        store,
        materializer,
        sessions,
    }
}

impl Harness {
    pub async fn session_ending_at(&self, partner_id: Uuid, end: DateTime<Utc>) -> VideoSession {
        self.store
            .insert_video_session(NewVideoSession {
                partner_id,
                client_id: Uuid::new_v4(),
                title: "Therapy Session".to_string(),
                interval: TimeInterval::new(end - chrono::Duration::hours(1), end).unwrap(),
                timezone: "UTC".to_string(),
                appointment_id: None,
            })
            .await
            .unwrap()
    }
}
