// libs/availability-cell/src/services/calendar.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};
use shared_models::scheduling::TimeInterval;

use crate::models::ExternalCalendarEvent;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CalendarError {
    #[error("Calendar token lookup failed: {0}")]
    TokenLookup(String),

    #[error("Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Calendar transport error: {0}")]
    Transport(String),

    #[error("Calendar response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CalendarError::Decode(err.to_string())
        } else {
            CalendarError::Transport(err.to_string())
        }
    }
}

impl From<DatabaseError> for CalendarError {
    fn from(err: DatabaseError) -> Self {
        CalendarError::TokenLookup(err.to_string())
    }
}

/// Read-only view of a provider's externally owned calendar.
#[async_trait]
pub trait ExternalCalendar: Send + Sync {
    async fn list_events(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> Result<Vec<ExternalCalendarEvent>, CalendarError>;
}

/// Provider without a connected calendar.
pub struct NoExternalCalendar;

#[async_trait]
impl ExternalCalendar for NoExternalCalendar {
    async fn list_events(
        &self,
        _partner_id: Uuid,
        _interval: TimeInterval,
    ) -> Result<Vec<ExternalCalendarEvent>, CalendarError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct CalendarToken {
    access_token: String,
    #[serde(default)]
    calendar_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    transparency: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default)]
    date_time: Option<DateTime<Utc>>,
    /// All-day events carry only a date.
    #[serde(default)]
    date: Option<NaiveDate>,
}

impl EventTime {
    fn instant(&self) -> Option<DateTime<Utc>> {
        self.date_time.or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
    }
}

impl GoogleEvent {
    /// Cancelled and "free" events never block time.
    fn into_busy_event(self) -> Option<ExternalCalendarEvent> {
        if self.status.as_deref() == Some("cancelled")
            || self.transparency.as_deref() == Some("transparent")
        {
            return None;
        }
        let start = self.start.as_ref()?.instant()?;
        let end = self.end.as_ref()?.instant()?;
        Some(ExternalCalendarEvent {
            id: self.id,
            summary: self.summary,
            start,
            end,
        })
    }
}

/// Google Calendar v3 client using each partner's stored OAuth access token.
pub struct GoogleCalendarClient {
    http: Client,
    base_url: String,
    supabase: SupabaseClient,
}

impl GoogleCalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.google_calendar_base_url.trim_end_matches('/').to_string(),
            supabase: SupabaseClient::with_service_role(config),
        }
    }

    async fn token_for(&self, partner_id: Uuid) -> Result<Option<CalendarToken>, CalendarError> {
        let path = format!(
            "/rest/v1/google_calendar_tokens?partner_id=eq.{}&select=access_token,calendar_id",
            partner_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(self.supabase.api_key()), None)
            .await?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| CalendarError::Decode(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ExternalCalendar for GoogleCalendarClient {
    #[instrument(skip(self))]
    async fn list_events(
        &self,
        partner_id: Uuid,
        interval: TimeInterval,
    ) -> Result<Vec<ExternalCalendarEvent>, CalendarError> {
        let Some(token) = self.token_for(partner_id).await? else {
            debug!("Partner {} has no connected calendar", partner_id);
            return Ok(Vec::new());
        };

        let calendar_id = token.calendar_id.as_deref().unwrap_or("primary");
        let url = format!(
            "{}/calendars/{}/events?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime",
            self.base_url,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&interval.start.to_rfc3339()),
            urlencoding::encode(&interval.end.to_rfc3339()),
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Calendar API returned {} for partner {}", status, partner_id);
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let events: EventList = response.json().await?;
        let busy: Vec<ExternalCalendarEvent> = events
            .items
            .into_iter()
            .filter_map(GoogleEvent::into_busy_event)
            .collect();

        debug!("Fetched {} busy calendar events for partner {}", busy.len(), partner_id);
        Ok(busy)
    }
}
