// libs/session-cell/src/services/records.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};
use shared_models::scheduling::{SessionRecord, VideoSession};

const THERAPY_SESSIONS: &str = "/rest/v1/therapy_sessions";

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MaterializeError {
    /// A record already exists for this video session. `existing` is filled
    /// in when it could be looked up.
    #[error("Session record already exists")]
    AlreadyExists { existing: Option<SessionRecord> },

    #[error("Session record rejected: {0}")]
    Rejected(String),

    #[error("Session record service unavailable: {0}")]
    Unavailable(String),
}

/// Creates the permanent clinical record for a finished video session.
#[async_trait]
pub trait SessionRecordMaterializer: Send + Sync {
    async fn create_from_video_session(
        &self,
        session: &VideoSession,
    ) -> Result<SessionRecord, MaterializeError>;
}

#[derive(Debug, Deserialize)]
struct TherapySessionRow {
    id: Uuid,
    video_session_id: Uuid,
}

impl From<TherapySessionRow> for SessionRecord {
    fn from(row: TherapySessionRow) -> Self {
        SessionRecord {
            id: row.id,
            video_session_id: row.video_session_id,
        }
    }
}

/// Writes `therapy_sessions` rows through PostgREST. The unique index on
/// `video_session_id` turns a duplicate insert into a 409.
pub struct SupabaseSessionRecordMaterializer {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSessionRecordMaterializer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::with_service_role(config)),
        }
    }

    async fn find_existing(&self, video_session_id: Uuid) -> Option<SessionRecord> {
        let path = format!(
            "{}?video_session_id=eq.{}&select=id,video_session_id",
            THERAPY_SESSIONS, video_session_id
        );
        let token = self.supabase.api_key().to_string();

        match self
            .supabase
            .request::<Vec<TherapySessionRow>>(Method::GET, &path, Some(&token), None)
            .await
        {
            Ok(rows) => rows.into_iter().next().map(SessionRecord::from),
            Err(e) => {
                warn!("Could not look up existing record for session {}: {}", video_session_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl SessionRecordMaterializer for SupabaseSessionRecordMaterializer {
    async fn create_from_video_session(
        &self,
        session: &VideoSession,
    ) -> Result<SessionRecord, MaterializeError> {
        let token = self.supabase.api_key().to_string();
        let body = json!({
            "video_session_id": session.id,
            "partner_id": session.partner_id,
            "client_id": session.client_id,
            "session_date": session.start_datetime,
            "duration_minutes": session.interval().duration_minutes(),
            "session_title": session.title,
        });

        let result = self
            .supabase
            .request_returning(Method::POST, THERAPY_SESSIONS, Some(&token), Some(body))
            .await;

        match result {
            Ok(rows) => {
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| MaterializeError::Rejected("insert returned no row".to_string()))?;
                let row: TherapySessionRow = serde_json::from_value(row)
                    .map_err(|e| MaterializeError::Rejected(e.to_string()))?;
                info!("Created session record {} for video session {}", row.id, session.id);
                Ok(row.into())
            }
            Err(DatabaseError::Conflict(_)) => {
                debug!("Session record for {} already exists", session.id);
                Err(MaterializeError::AlreadyExists {
                    existing: self.find_existing(session.id).await,
                })
            }
            Err(DatabaseError::Transport(msg)) => Err(MaterializeError::Unavailable(msg)),
            Err(DatabaseError::Api { status, message }) if status >= 500 => {
                Err(MaterializeError::Unavailable(message))
            }
            Err(e) => Err(MaterializeError::Rejected(e.to_string())),
        }
    }
}
