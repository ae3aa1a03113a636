use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Actor, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_key: "test-service-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            razorpay_key_id: "rzp_test_key".to_string(),
            razorpay_key_secret: "rzp_test_secret".to_string(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "client")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn partner(email: &str) -> Self {
        Self::new(email, "partner")
    }

    pub fn client(email: &str) -> Self {
        Self::new(email, "client")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn to_actor(&self) -> Option<Actor> {
        Actor::try_from(&self.to_user()).ok()
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let signature_encoded = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(signing_input.as_bytes());
                general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
            })
            .unwrap_or_default();

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// PostgREST row fixtures shaped like the scheduling tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn slot_response(
        slot_id: Uuid,
        partner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": slot_id,
            "partner_id": partner_id,
            "start_datetime": start,
            "end_datetime": end,
            "timezone": "Asia/Kolkata",
            "status": status,
            "is_published": true,
            "has_external_conflict": false,
            "conflict_details": null,
            "held_by_booking_id": null,
            "hold_expires_at": null,
            "booked_by_client_id": null,
            "booked_at": null,
            "appointment_id": null,
            "last_published_at": null,
            "archived_at": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn booking_response(booking_id: Uuid, slot_id: Uuid, partner_id: Uuid, client_id: Uuid, status: &str) -> Value {
        json!({
            "id": booking_id,
            "slot_id": slot_id,
            "partner_id": partner_id,
            "client_id": client_id,
            "status": status,
            "channel": "client",
            "amount_due": 50000,
            "amount_paid": 0,
            "upfront_amount": 10000,
            "currency": "INR",
            "order_id": null,
            "payment_id": null,
            "remaining_order_id": null,
            "remaining_payment_id": null,
            "slot_prior_status": "available_online",
            "appointment_id": null,
            "expires_at": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn video_session_response(
        session_id: Uuid,
        partner_id: Uuid,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": session_id,
            "partner_id": partner_id,
            "client_id": client_id,
            "title": "Therapy Session - Online",
            "start_datetime": start,
            "end_datetime": end,
            "timezone": "UTC",
            "status": status,
            "therapy_session_id": null,
            "appointment_id": null,
            "auto_completed": false,
            "completed_at": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_payment_configured());
        assert!(!app_config.payment_test_mode);
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::partner("partner@example.com");
        assert_eq!(user.role, "partner");

        let user_model = user.to_user();
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
        assert_eq!(user.to_actor().map(|a| a.id), Some(user.uuid()));
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));
        assert_eq!(token.split('.').count(), 3);
    }
}
