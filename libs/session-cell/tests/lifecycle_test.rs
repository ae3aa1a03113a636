mod common;

use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use futures::future::join_all;
use uuid::Uuid;

use common::harness;
use session_cell::{
    AutoCompleteSessionsSweep, ConflictDecision, DirectAppointmentRequest, ScheduleSessionRequest,
    SessionError,
};
use shared_database::SchedulingStore;
use shared_models::auth::Actor;
use shared_models::scheduling::VideoSessionStatus;
use shared_utils::sweep::SweepTask;

fn schedule_request(client_id: Uuid, start_time: &str, decision: Option<ConflictDecision>) -> ScheduleSessionRequest {
    ScheduleSessionRequest {
        partner_id: None,
        client_id,
        date: (Utc::now() + Duration::days(2)).format("%Y-%m-%d").to_string(),
        start_time: start_time.to_string(),
        duration_minutes: 60,
        timezone: "Asia/Kolkata".to_string(),
        title: None,
        decision,
    }
}

#[tokio::test]
async fn test_schedule_without_conflicts_creates_session_and_appointment() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());

    let scheduled = h
        .sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "10:00", None))
        .await
        .unwrap();

    assert_eq!(scheduled.session.status, VideoSessionStatus::Scheduled);
    assert_eq!(scheduled.session.title, "Therapy Session");
    assert_eq!(scheduled.session.interval().duration_minutes(), 60);
    let appointment = scheduled.appointment.unwrap();
    assert_eq!(scheduled.session.appointment_id, Some(appointment.id));
    assert!(scheduled.conflict_report.is_none());
}

#[tokio::test]
async fn test_conflict_without_decision_writes_nothing() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    h.sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "10:00", None))
        .await
        .unwrap();
    let before = h.store.appointment_count();

    let result = h
        .sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "10:30", None))
        .await;

    assert_matches!(result, Err(SessionError::ConflictsFound(report)) if report.has_conflicts());
    assert_eq!(h.store.appointment_count(), before);
}

#[tokio::test]
async fn test_conflict_decisions() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    h.sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "10:00", None))
        .await
        .unwrap();

    let anyway = h
        .sessions
        .schedule(
            &partner,
            schedule_request(Uuid::new_v4(), "10:30", Some(ConflictDecision::CreateAnyway)),
        )
        .await
        .unwrap();
    assert!(anyway.appointment.is_some());
    assert!(anyway.conflict_report.is_some());

    let skipped = h
        .sessions
        .schedule(
            &partner,
            schedule_request(Uuid::new_v4(), "10:15", Some(ConflictDecision::SkipAppointment)),
        )
        .await
        .unwrap();
    assert!(skipped.appointment.is_none());
    assert!(skipped.session.appointment_id.is_none());
    assert_eq!(h.store.appointment_count(), 2);
}

#[tokio::test]
async fn test_touching_sessions_do_not_conflict() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    h.sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "10:00", None))
        .await
        .unwrap();

    let next = h
        .sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "11:00", None))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_invalid_duration_and_zone_are_rejected() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());

    let mut request = schedule_request(Uuid::new_v4(), "10:00", None);
    request.duration_minutes = 0;
    assert_matches!(
        h.sessions.schedule(&partner, request).await,
        Err(SessionError::InvalidTime(_))
    );

    let mut request = schedule_request(Uuid::new_v4(), "10:00", None);
    request.timezone = "Mars/Olympus".to_string();
    assert_matches!(
        h.sessions.schedule(&partner, request).await,
        Err(SessionError::InvalidTime(msg)) if msg.contains("Mars/Olympus")
    );
}

#[tokio::test]
async fn test_partner_cannot_schedule_for_someone_else() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    let mut request = schedule_request(Uuid::new_v4(), "10:00", None);
    request.partner_id = Some(Uuid::new_v4());

    assert_matches!(
        h.sessions.schedule(&partner, request).await,
        Err(SessionError::Unauthorized)
    );
}

#[tokio::test]
async fn test_manual_lifecycle_materializes_record_on_completion() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    let scheduled = h
        .sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "09:00", None))
        .await
        .unwrap();
    let id = scheduled.session.id;

    let started = h.sessions.start(&partner, id).await.unwrap();
    assert_eq!(started.status, VideoSessionStatus::InProgress);

    let completed = h.sessions.complete(&partner, id).await.unwrap();
    assert_eq!(completed.status, VideoSessionStatus::Completed);
    assert!(!completed.auto_completed);
    assert_eq!(
        completed.therapy_session_id,
        h.materializer.record_for(id).map(|r| r.id)
    );

    assert_matches!(
        h.sessions.cancel(&partner, id).await,
        Err(SessionError::InvalidStatusTransition {
            from: VideoSessionStatus::Completed,
            to: VideoSessionStatus::Cancelled
        })
    );
}

#[tokio::test]
async fn test_in_progress_cannot_restart() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    let scheduled = h
        .sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "09:00", None))
        .await
        .unwrap();

    h.sessions.start(&partner, scheduled.session.id).await.unwrap();
    assert_matches!(
        h.sessions.start(&partner, scheduled.session.id).await,
        Err(SessionError::InvalidStatusTransition { .. })
    );

    let cancelled = h.sessions.cancel(&partner, scheduled.session.id).await.unwrap();
    assert_eq!(cancelled.status, VideoSessionStatus::Cancelled);
}

#[tokio::test]
async fn test_completion_waits_for_record_service() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    let scheduled = h
        .sessions
        .schedule(&partner, schedule_request(Uuid::new_v4(), "09:00", None))
        .await
        .unwrap();

    h.materializer.unavailable.store(true, Ordering::SeqCst);
    assert_matches!(
        h.sessions.complete(&partner, scheduled.session.id).await,
        Err(SessionError::Materialization(_))
    );

    let session = h.store.get_video_session(scheduled.session.id).await.unwrap().unwrap();
    assert_eq!(session.status, VideoSessionStatus::Scheduled);
}

#[tokio::test]
async fn test_sweep_completes_only_sessions_past_grace() {
    let h = harness();
    let partner_id = Uuid::new_v4();
    let now = Utc::now();
    let stale = h.session_ending_at(partner_id, now - Duration::hours(30)).await;
    let recent = h.session_ending_at(partner_id, now - Duration::hours(2)).await;

    let summary = h.sessions.auto_complete_stale(now).await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.completed, 1);

    let stale = h.store.get_video_session(stale.id).await.unwrap().unwrap();
    assert_eq!(stale.status, VideoSessionStatus::Completed);
    assert!(stale.auto_completed);
    assert!(stale.therapy_session_id.is_some());

    let recent = h.store.get_video_session(recent.id).await.unwrap().unwrap();
    assert_eq!(recent.status, VideoSessionStatus::Scheduled);
}

#[tokio::test]
async fn test_sweep_leaves_failures_for_next_pass() {
    let h = harness();
    let now = Utc::now();
    let stale = h.session_ending_at(Uuid::new_v4(), now - Duration::hours(48)).await;

    h.materializer.unavailable.store(true, Ordering::SeqCst);
    let summary = h.sessions.auto_complete_stale(now).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);
    let session = h.store.get_video_session(stale.id).await.unwrap().unwrap();
    assert_eq!(session.status, VideoSessionStatus::Scheduled);

    h.materializer.unavailable.store(false, Ordering::SeqCst);
    let summary = h.sessions.auto_complete_stale(now).await.unwrap();
    assert_eq!(summary.completed, 1);
}

#[tokio::test]
async fn test_concurrent_sweeps_complete_each_session_once() {
    let h = harness();
    let now = Utc::now();
    let partner_id = Uuid::new_v4();
    for hours in [26, 30, 72] {
        h.session_ending_at(partner_id, now - Duration::hours(hours)).await;
    }

    let sweep = std::sync::Arc::new(AutoCompleteSessionsSweep::new(h.sessions.clone()));
    let runs = (0..4).map(|_| {
        let sweep = sweep.clone();
        tokio::spawn(async move { sweep.run_once().await })
    });

    let completed: usize = join_all(runs)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .sum();

    assert_eq!(completed, 3);
    assert_eq!(h.materializer.record_count(), 3);
    assert_eq!(sweep.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_client_can_view_but_stranger_cannot() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    let client = Actor::client(Uuid::new_v4());
    let scheduled = h
        .sessions
        .schedule(&partner, schedule_request(client.id, "14:00", None))
        .await
        .unwrap();

    assert!(h.sessions.get_session(&client, scheduled.session.id).await.is_ok());
    let stranger = Actor::client(Uuid::new_v4());
    assert_matches!(
        h.sessions.get_session(&stranger, scheduled.session.id).await,
        Err(SessionError::Unauthorized)
    );
}

fn appointment_request(client_id: Uuid, title: Option<&str>) -> DirectAppointmentRequest {
    DirectAppointmentRequest {
        partner_id: None,
        client_id,
        date: "2030-01-15".to_string(),
        start_time: "09:30".to_string(),
        duration_minutes: 30,
        timezone: "Asia/Kolkata".to_string(),
        title: title.map(str::to_string),
        notes: Some("Intake call".to_string()),
    }
}

#[tokio::test]
async fn test_partner_creates_appointment_directly() {
    let h = harness();
    let partner = Actor::partner(Uuid::new_v4());
    let client_id = Uuid::new_v4();

    let appointment = h
        .sessions
        .create_appointment(&partner, appointment_request(client_id, Some("  ")))
        .await
        .unwrap();

    assert_eq!(appointment.partner_id, partner.id);
    assert_eq!(appointment.client_id, client_id);
    assert_eq!(appointment.title, "Therapy Session");
    assert_eq!(appointment.notes.as_deref(), Some("Intake call"));
    assert!(appointment.slot_id.is_none());
    assert_eq!(appointment.start_datetime.to_rfc3339(), "2030-01-15T04:00:00+00:00");
    assert_eq!(appointment.interval().duration_minutes(), 30);
}

#[tokio::test]
async fn test_client_cannot_create_appointment_for_partner() {
    let h = harness();
    let client = Actor::client(Uuid::new_v4());
    let mut request = appointment_request(client.id, None);
    request.partner_id = Some(Uuid::new_v4());

    let result = h.sessions.create_appointment(&client, request).await;

    assert_matches!(result, Err(SessionError::Unauthorized));
}
