use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_database::{
    DatabaseError, RemainingPaymentRecord, SchedulingStore, SupabaseSchedulingStore,
    VideoSessionTransition,
};
use shared_models::scheduling::{SlotStatus, VideoSessionStatus};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

async fn store_for(server: &MockServer) -> SupabaseSchedulingStore {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = server.uri();
    SupabaseSchedulingStore::new(&config)
}

#[tokio::test]
async fn test_get_slot_decodes_row() {
    let server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let partner_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(1);

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(header("apikey", "test-service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::slot_response(slot_id, partner_id, start, start + Duration::hours(1), "available_online"),
        ]))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let slot = store.get_slot(slot_id).await.unwrap().unwrap();
    assert_eq!(slot.partner_id, partner_id);
    assert_eq!(slot.status, SlotStatus::AvailableOnline);
}

#[tokio::test]
async fn test_conditional_delete_with_no_rows_means_precondition_failed() {
    let server = MockServer::start().await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("status", "neq.booked"))
        .and(query_param("held_by_booking_id", "is.null"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert!(store.delete_unbooked_slot(slot_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reserve_slot_null_rpc_result_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reserve_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let request = shared_database::ReservationRequest {
        slot_id: Uuid::new_v4(),
        booking_id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        channel: Default::default(),
        amount_due: 0,
        upfront_amount: 0,
        currency: "INR".to_string(),
        order_id: None,
        mode: shared_database::ReservationMode::Commit {
            appointment_id: Uuid::new_v4(),
            appointment_title: "Therapy Session - Online".to_string(),
        },
        now: Utc::now(),
    };
    assert!(store.reserve_slot(request).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transition_sends_status_guard_and_completion_fields() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let record_id = Uuid::new_v4();
    let end = Utc::now() - Duration::hours(30);

    let mut row = MockSupabaseResponses::video_session_response(
        session_id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        end - Duration::hours(1),
        end,
        "completed",
    );
    row["therapy_session_id"] = json!(record_id);
    row["auto_completed"] = json!(true);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/video_sessions"))
        .and(query_param("status", "in.(scheduled,in_progress)"))
        .and(query_param("therapy_session_id", "is.null"))
        .and(body_partial_json(json!({ "status": "completed", "auto_completed": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![row]))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let updated = store
        .transition_video_session(VideoSessionTransition {
            session_id,
            from: vec![VideoSessionStatus::Scheduled, VideoSessionStatus::InProgress],
            to: VideoSessionStatus::Completed,
            therapy_session_id: Some(record_id),
            require_unlinked: true,
            auto_completed: true,
            now: Utc::now(),
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.status, VideoSessionStatus::Completed);
    assert_eq!(updated.therapy_session_id, Some(record_id));
}

#[tokio::test]
async fn test_http_conflict_maps_to_conflict_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/delete_slot_cascade"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(MockSupabaseResponses::error_response("row locked", "55P03")),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let result = store.delete_slot_cascade(Uuid::new_v4()).await;
    assert_matches!(result, Err(DatabaseError::Conflict(_)));
}

#[tokio::test]
async fn test_remaining_payment_is_guarded_by_balance_order() {
    let server = MockServer::start().await;
    let booking_id = Uuid::new_v4();
    let mut row = MockSupabaseResponses::booking_response(
        booking_id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "confirmed",
    );
    row["amount_paid"] = json!(50000);
    row["remaining_order_id"] = json!("order_balance");
    row["remaining_payment_id"] = json!("pay_balance");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slot_bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .and(query_param("status", "eq.confirmed"))
        .and(query_param("remaining_order_id", "eq.order_balance"))
        .and(query_param("remaining_payment_id", "is.null"))
        .and(body_partial_json(json!({ "amount_paid": 50000, "remaining_payment_id": "pay_balance" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let booking = store
        .record_remaining_payment(RemainingPaymentRecord {
            booking_id,
            order_id: "order_balance".to_string(),
            payment_id: "pay_balance".to_string(),
            amount_paid: 50000,
            now: Utc::now(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(booking.outstanding(), 0);
    assert_eq!(booking.remaining_payment_id.as_deref(), Some("pay_balance"));
}
