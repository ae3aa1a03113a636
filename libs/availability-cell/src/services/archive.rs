// libs/availability-cell/src/services/archive.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;

use shared_database::SchedulingStore;
use shared_utils::sweep::SweepTask;

/// Soft-archives slots that ended more than `retention` ago so they drop out
/// of listings and can no longer be booked.
pub struct SlotArchiveSweep {
    store: Arc<dyn SchedulingStore>,
    retention: Duration,
}

impl SlotArchiveSweep {
    pub fn new(store: Arc<dyn SchedulingStore>, retention: Duration) -> Self {
        Self { store, retention }
    }
}

#[async_trait]
impl SweepTask for SlotArchiveSweep {
    fn name(&self) -> &'static str {
        "slot-archive"
    }

    async fn run_once(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - self.retention;
        debug!("Archiving slots that ended before {}", cutoff);
        let archived = self.store.archive_slots_ended_before(cutoff).await?;
        Ok(archived as usize)
    }
}
