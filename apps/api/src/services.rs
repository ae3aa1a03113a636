use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use availability_cell::{ConflictDetector, GoogleCalendarClient, SlotArchiveSweep, SlotService};
use booking_cell::{BookingService, CascadeDeletionCoordinator, ExpirePendingBookingsSweep, RazorpayGateway};
use session_cell::{AutoCompleteSessionsSweep, SessionLifecycleManager, SupabaseSessionRecordMaterializer};
use shared_config::AppConfig;
use shared_database::{SchedulingStore, SupabaseSchedulingStore};
use shared_utils::sweep::{SweepHandle, SweepRunner};

/// Everything the routers and sweeps share, built once at startup.
pub struct Services {
    pub store: Arc<dyn SchedulingStore>,
    pub slots: Arc<SlotService>,
    pub bookings: Arc<BookingService>,
    pub cascade: Arc<CascadeDeletionCoordinator>,
    pub sessions: Arc<SessionLifecycleManager>,
}

impl Services {
    pub fn build(config: &AppConfig) -> Self {
        let store: Arc<dyn SchedulingStore> = Arc::new(SupabaseSchedulingStore::new(config));

        let detector = Arc::new(ConflictDetector::new(
            store.clone(),
            Arc::new(GoogleCalendarClient::new(config)),
            config.calendar_timeout(),
        ));
        let slots = Arc::new(SlotService::new(store.clone(), detector.clone()));

        let bookings = Arc::new(BookingService::new(
            store.clone(),
            Arc::new(RazorpayGateway::new(config)),
            config.payment_timeout(),
            config.pending_payment_ttl(),
        ));
        let cascade = Arc::new(CascadeDeletionCoordinator::new(store.clone()));

        let sessions = Arc::new(SessionLifecycleManager::new(
            store.clone(),
            detector,
            Arc::new(SupabaseSessionRecordMaterializer::new(config)),
            config.session_grace_period(),
        ));

        Self {
            store,
            slots,
            bookings,
            cascade,
            sessions,
        }
    }

    /// Starts the periodic sweeps, each on its own interval.
    pub fn spawn_sweeps(&self, config: &AppConfig) -> Vec<SweepHandle> {
        let runners = vec![
            SweepRunner::new(
                Arc::new(AutoCompleteSessionsSweep::new(self.sessions.clone())),
                Duration::from_secs(config.session_sweep_interval_secs),
            ),
            SweepRunner::new(
                Arc::new(ExpirePendingBookingsSweep::new(self.bookings.clone())),
                Duration::from_secs(config.booking_expiry_sweep_interval_secs),
            ),
            SweepRunner::new(
                Arc::new(SlotArchiveSweep::new(self.store.clone(), config.slot_retention())),
                Duration::from_secs(config.slot_archive_sweep_interval_secs),
            )
            // A daily pass must not hang until the next one.
            .with_run_timeout(Duration::from_secs(600)),
        ];

        info!("Spawning {} background sweep(s)", runners.len());
        runners.into_iter().map(SweepRunner::spawn).collect()
    }
}
