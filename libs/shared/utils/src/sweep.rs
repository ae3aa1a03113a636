//! Periodic background sweeps (expired holds, stale sessions, old slots).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// One pass of a periodic cleanup job. Implementations must be safe to run
/// repeatedly and concurrently with user traffic.
#[async_trait]
pub trait SweepTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Runs a single pass and returns how many items it changed.
    async fn run_once(&self) -> anyhow::Result<usize>;
}

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct SweepRunner {
    task: Arc<dyn SweepTask>,
    every: Duration,
    run_timeout: Duration,
    shutdown_grace: Duration,
    is_shutdown: Arc<RwLock<bool>>,
    wake: Arc<Notify>,
}

pub struct SweepHandle {
    name: &'static str,
    is_shutdown: Arc<RwLock<bool>>,
    wake: Arc<Notify>,
    shutdown_grace: Duration,
    handle: JoinHandle<()>,
}

impl SweepHandle {
    /// Stops the sweep after any pass in flight finishes. A pass still
    /// running after the grace period is aborted.
    pub async fn shutdown(mut self) {
        *self.is_shutdown.write().await = true;
        self.wake.notify_one();

        match timeout(self.shutdown_grace, &mut self.handle).await {
            Ok(Ok(())) => info!("Sweep '{}' stopped", self.name),
            Ok(Err(e)) => error!("Sweep '{}' ended abnormally: {}", self.name, e),
            Err(_) => {
                warn!(
                    "Sweep '{}' still running after {:?}; aborting",
                    self.name, self.shutdown_grace
                );
                self.handle.abort();
            }
        }
    }
}

impl SweepRunner {
    pub fn new(task: Arc<dyn SweepTask>, every: Duration) -> Self {
        Self {
            task,
            every,
            // A pass never outlives its own period.
            run_timeout: every,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            is_shutdown: Arc::new(RwLock::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Runs one pass, logging the outcome. Errors never escape: the next
    /// tick simply tries again.
    pub async fn tick(&self) -> Option<usize> {
        let name = self.task.name();
        match timeout(self.run_timeout, self.task.run_once()).await {
            Ok(Ok(0)) => {
                debug!("Sweep '{}' found nothing to do", name);
                Some(0)
            }
            Ok(Ok(changed)) => {
                info!("Sweep '{}' processed {} item(s)", name, changed);
                Some(changed)
            }
            Ok(Err(e)) => {
                error!("Sweep '{}' failed: {:#}", name, e);
                None
            }
            Err(_) => {
                warn!("Sweep '{}' timed out after {:?}", name, self.run_timeout);
                None
            }
        }
    }

    pub fn spawn(self) -> SweepHandle {
        let name = self.task.name();
        let is_shutdown = self.is_shutdown.clone();
        let wake = self.wake.clone();
        let shutdown_grace = self.shutdown_grace;
        info!("Starting sweep '{}' every {:?}", name, self.every);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.wake.notified() => {}
                }
                if *self.is_shutdown.read().await {
                    debug!("Sweep '{}' received shutdown signal", name);
                    break;
                }
                self.tick().await;
            }
        });

        SweepHandle {
            name,
            is_shutdown,
            wake,
            shutdown_grace,
            handle,
        }
    }
}
