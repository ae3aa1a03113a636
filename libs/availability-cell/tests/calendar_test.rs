use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::{CalendarError, ExternalCalendar, GoogleCalendarClient};
use shared_models::scheduling::TimeInterval;
use shared_utils::test_utils::TestConfig;

fn window() -> TimeInterval {
    TimeInterval::new(
        Utc.with_ymd_and_hms(2030, 3, 10, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2030, 3, 11, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

async fn client_for(supabase: &MockServer, google: &MockServer) -> GoogleCalendarClient {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = supabase.uri();
    config.google_calendar_base_url = google.uri();
    GoogleCalendarClient::new(&config)
}

async fn mount_token(supabase: &MockServer, partner_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/google_calendar_tokens"))
        .and(query_param("partner_id", format!("eq.{}", partner_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "access_token": "ya29.token", "calendar_id": "primary" }
        ])))
        .mount(supabase)
        .await;
}

#[tokio::test]
async fn test_partner_without_token_has_no_events() {
    let supabase = MockServer::start().await;
    let google = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/google_calendar_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&supabase)
        .await;

    let client = client_for(&supabase, &google).await;
    let events = client.list_events(Uuid::new_v4(), window()).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_busy_events_are_projected_and_free_ones_skipped() {
    let supabase = MockServer::start().await;
    let google = MockServer::start().await;
    let partner_id = Uuid::new_v4();
    mount_token(&supabase, partner_id).await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(header("authorization", "Bearer ya29.token"))
        .and(query_param("singleEvents", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "evt1",
                    "summary": "Dentist",
                    "status": "confirmed",
                    "start": { "dateTime": "2030-03-10T10:00:00Z" },
                    "end": { "dateTime": "2030-03-10T11:00:00Z" }
                },
                {
                    "id": "evt2",
                    "summary": "Lunch (free)",
                    "transparency": "transparent",
                    "start": { "dateTime": "2030-03-10T12:00:00Z" },
                    "end": { "dateTime": "2030-03-10T13:00:00Z" }
                },
                {
                    "id": "evt3",
                    "status": "cancelled",
                    "start": { "dateTime": "2030-03-10T14:00:00Z" },
                    "end": { "dateTime": "2030-03-10T15:00:00Z" }
                },
                {
                    "id": "evt4",
                    "summary": "Conference",
                    "start": { "date": "2030-03-10" },
                    "end": { "date": "2030-03-11" }
                }
            ]
        })))
        .mount(&google)
        .await;

    let client = client_for(&supabase, &google).await;
    let events = client.list_events(partner_id, window()).await.unwrap();

    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["evt1", "evt4"]);
    assert_eq!(events[1].start, Utc.with_ymd_and_hms(2030, 3, 10, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn test_expired_calendar_token_is_an_error() {
    let supabase = MockServer::start().await;
    let google = MockServer::start().await;
    let partner_id = Uuid::new_v4();
    mount_token(&supabase, partner_id).await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&google)
        .await;

    let client = client_for(&supabase, &google).await;
    let result = client.list_events(partner_id, window()).await;
    assert_matches!(result, Err(CalendarError::Api { status: 401, .. }));
}
