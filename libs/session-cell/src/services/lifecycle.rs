// libs/session-cell/src/services/lifecycle.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use availability_cell::services::time;
use availability_cell::ConflictDetector;
use shared_database::{SchedulingStore, VideoSessionTransition};
use shared_models::auth::Actor;
use shared_models::scheduling::{
    Appointment, NewAppointment, NewVideoSession, SessionRecord, TimeInterval, VideoSession,
    VideoSessionStatus,
};
use shared_utils::sweep::SweepTask;

use crate::models::{
    ConflictDecision, DirectAppointmentRequest, ScheduleSessionRequest, ScheduledSession,
    SessionError, SweepSummary,
};
use crate::services::records::{MaterializeError, SessionRecordMaterializer};

const DEFAULT_SESSION_TITLE: &str = "Therapy Session";
const MAX_SESSION_MINUTES: i64 = 24 * 60;

/// Drives video sessions through scheduled, in progress, completed and
/// cancelled. Every status change is a compare-and-set on the current status,
/// so manual actions and the auto-completion sweep never double-apply.
pub struct SessionLifecycleManager {
    store: Arc<dyn SchedulingStore>,
    detector: Arc<ConflictDetector>,
    materializer: Arc<dyn SessionRecordMaterializer>,
    grace: Duration,
}

impl SessionLifecycleManager {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        detector: Arc<ConflictDetector>,
        materializer: Arc<dyn SessionRecordMaterializer>,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            detector,
            materializer,
            grace,
        }
    }

    fn resolve_interval(
        date: &str,
        start_time: &str,
        duration_minutes: i64,
        timezone: &str,
    ) -> Result<TimeInterval, SessionError> {
        if duration_minutes <= 0 || duration_minutes > MAX_SESSION_MINUTES {
            return Err(SessionError::InvalidTime(format!(
                "duration must be between 1 and {} minutes",
                MAX_SESSION_MINUTES
            )));
        }
        let start = time::to_utc(date, start_time, timezone)?;
        TimeInterval::new(start, start + Duration::minutes(duration_minutes))
            .ok_or_else(|| SessionError::InvalidTime("session must end after it starts".to_string()))
    }

    fn title_or_default(title: Option<&str>) -> String {
        title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE)
            .to_string()
    }

    // ===== SCHEDULING =====

    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn schedule(
        &self,
        actor: &Actor,
        request: ScheduleSessionRequest,
    ) -> Result<ScheduledSession, SessionError> {
        let partner_id = request.partner_id.unwrap_or(actor.id);
        if !actor.can_manage_partner(partner_id) {
            return Err(SessionError::Unauthorized);
        }

        let interval = Self::resolve_interval(
            &request.date,
            &request.start_time,
            request.duration_minutes,
            &request.timezone,
        )?;
        let title = Self::title_or_default(request.title.as_deref());

        let report = self.detector.find_conflicts(partner_id, interval).await;
        if report.has_conflicts() && request.decision.is_none() {
            info!(
                "Session for partner {} not created: {} conflict(s) need a decision",
                partner_id,
                report.conflicts.len()
            );
            return Err(SessionError::ConflictsFound(report));
        }

        let appointment = match request.decision {
            Some(ConflictDecision::SkipAppointment) => None,
            _ => Some(
                self.store
                    .insert_appointment(NewAppointment {
                        partner_id,
                        client_id: request.client_id,
                        slot_id: None,
                        title: title.clone(),
                        interval,
                        notes: None,
                    })
                    .await?,
            ),
        };

        let session = self
            .store
            .insert_video_session(NewVideoSession {
                partner_id,
                client_id: request.client_id,
                title,
                interval,
                timezone: request.timezone.trim().to_string(),
                appointment_id: appointment.as_ref().map(|a| a.id),
            })
            .await
            .map_err(|e| {
                if let Some(appointment) = &appointment {
                    error!(
                        "Video session insert failed after appointment {} was created: {}",
                        appointment.id, e
                    );
                }
                SessionError::from(e)
            })?;

        info!("Scheduled video session {} for partner {}", session.id, partner_id);
        Ok(ScheduledSession {
            session,
            appointment,
            conflict_report: report.has_conflicts().then_some(report),
        })
    }

    /// Adds an appointment straight to the provider's schedule.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn create_appointment(
        &self,
        actor: &Actor,
        request: DirectAppointmentRequest,
    ) -> Result<Appointment, SessionError> {
        let partner_id = request.partner_id.unwrap_or(actor.id);
        if !actor.can_manage_partner(partner_id) {
            return Err(SessionError::Unauthorized);
        }
        let interval = Self::resolve_interval(
            &request.date,
            &request.start_time,
            request.duration_minutes,
            &request.timezone,
        )?;

        let appointment = self
            .store
            .insert_appointment(NewAppointment {
                partner_id,
                client_id: request.client_id,
                slot_id: None,
                title: Self::title_or_default(request.title.as_deref()),
                interval,
                notes: request.notes,
            })
            .await?;
        info!("Created appointment {} for partner {}", appointment.id, partner_id);
        Ok(appointment)
    }

    // ===== MANUAL TRANSITIONS =====

    async fn load_for(&self, actor: &Actor, session_id: Uuid) -> Result<VideoSession, SessionError> {
        let session = self
            .store
            .get_video_session(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound)?;
        if actor.id != session.client_id && !actor.can_manage_partner(session.partner_id) {
            return Err(SessionError::Unauthorized);
        }
        Ok(session)
    }

    pub async fn get_session(&self, actor: &Actor, session_id: Uuid) -> Result<VideoSession, SessionError> {
        self.load_for(actor, session_id).await
    }

    /// Applies `to` if the session is still in `from`. A lost race is reported
    /// as an invalid transition from whatever status won.
    async fn transition(
        &self,
        session: &VideoSession,
        to: VideoSessionStatus,
        record: Option<&SessionRecord>,
        auto_completed: bool,
    ) -> Result<VideoSession, SessionError> {
        let from: Vec<VideoSessionStatus> = [VideoSessionStatus::Scheduled, VideoSessionStatus::InProgress]
            .into_iter()
            .filter(|status| status.can_transition_to(to))
            .collect();

        let updated = self
            .store
            .transition_video_session(VideoSessionTransition {
                session_id: session.id,
                from,
                to,
                therapy_session_id: record.map(|r| r.id),
                require_unlinked: false,
                auto_completed,
                now: Utc::now(),
            })
            .await?;

        match updated {
            Some(updated) => Ok(updated),
            None => {
                let current = self
                    .store
                    .get_video_session(session.id)
                    .await?
                    .ok_or(SessionError::SessionNotFound)?;
                info!(
                    "Session {} moved to {} concurrently; {} not applied",
                    session.id, current.status, to
                );
                Err(SessionError::InvalidStatusTransition {
                    from: current.status,
                    to,
                })
            }
        }
    }

    fn ensure_transition(session: &VideoSession, to: VideoSessionStatus) -> Result<(), SessionError> {
        if session.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(SessionError::InvalidStatusTransition {
                from: session.status,
                to,
            })
        }
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn start(&self, actor: &Actor, session_id: Uuid) -> Result<VideoSession, SessionError> {
        let session = self.load_for(actor, session_id).await?;
        Self::ensure_transition(&session, VideoSessionStatus::InProgress)?;
        let started = self
            .transition(&session, VideoSessionStatus::InProgress, None, false)
            .await?;
        info!("Session {} started", session_id);
        Ok(started)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn cancel(&self, actor: &Actor, session_id: Uuid) -> Result<VideoSession, SessionError> {
        let session = self.load_for(actor, session_id).await?;
        Self::ensure_transition(&session, VideoSessionStatus::Cancelled)?;
        let cancelled = self
            .transition(&session, VideoSessionStatus::Cancelled, None, false)
            .await?;
        info!("Session {} cancelled", session_id);
        Ok(cancelled)
    }

    /// Completes the session, creating its permanent record first if none is
    /// linked. The session is left open when the record cannot be created.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn complete(&self, actor: &Actor, session_id: Uuid) -> Result<VideoSession, SessionError> {
        let session = self.load_for(actor, session_id).await?;
        Self::ensure_transition(&session, VideoSessionStatus::Completed)?;

        let record = if session.has_session_record() {
            None
        } else {
            self.materialize(&session).await?
        };

        let completed = self
            .transition(&session, VideoSessionStatus::Completed, record.as_ref(), false)
            .await?;
        info!("Session {} completed", session_id);
        Ok(completed)
    }

    /// Creates the session record, treating an existing one as success.
    async fn materialize(&self, session: &VideoSession) -> Result<Option<SessionRecord>, MaterializeError> {
        match self.materializer.create_from_video_session(session).await {
            Ok(record) => Ok(Some(record)),
            Err(MaterializeError::AlreadyExists { existing }) => {
                debug!("Session record for {} already existed", session.id);
                Ok(existing)
            }
            Err(e) => Err(e),
        }
    }

    // ===== AUTO-COMPLETION =====

    /// Completes open sessions that ended more than the grace period before
    /// `now` and still have no session record. Failures are left for the
    /// next pass.
    #[instrument(skip(self))]
    pub async fn auto_complete_stale(&self, now: DateTime<Utc>) -> Result<SweepSummary, SessionError> {
        let cutoff = now - self.grace;
        let stale = self.store.list_stale_video_sessions(cutoff).await?;
        let mut summary = SweepSummary {
            examined: stale.len(),
            ..SweepSummary::default()
        };

        for session in stale {
            let record = match self.materialize(&session).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Could not create record for stale session {}: {}", session.id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let updated = self
                .store
                .transition_video_session(VideoSessionTransition {
                    session_id: session.id,
                    from: vec![VideoSessionStatus::Scheduled, VideoSessionStatus::InProgress],
                    to: VideoSessionStatus::Completed,
                    therapy_session_id: record.map(|r| r.id),
                    require_unlinked: true,
                    auto_completed: true,
                    now,
                })
                .await;

            match updated {
                Ok(Some(_)) => {
                    info!("Auto-completed session {}", session.id);
                    summary.completed += 1;
                }
                Ok(None) => debug!("Session {} was completed by another pass", session.id),
                Err(e) => {
                    warn!("Failed to auto-complete session {}: {}", session.id, e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Periodic driver for [`SessionLifecycleManager::auto_complete_stale`].
pub struct AutoCompleteSessionsSweep {
    sessions: Arc<SessionLifecycleManager>,
}

impl AutoCompleteSessionsSweep {
    pub fn new(sessions: Arc<SessionLifecycleManager>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl SweepTask for AutoCompleteSessionsSweep {
    fn name(&self) -> &'static str {
        "auto-complete-sessions"
    }

    async fn run_once(&self) -> anyhow::Result<usize> {
        let summary = self.sessions.auto_complete_stale(Utc::now()).await?;
        if summary.failed > 0 {
            warn!("{} stale session(s) will be retried", summary.failed);
        }
        Ok(summary.completed)
    }
}
