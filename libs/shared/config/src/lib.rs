use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub supabase_jwt_secret: String,
    pub google_calendar_base_url: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_base_url: String,
    /// Explicit payment bypass. When set, verification never contacts the gateway.
    pub payment_test_mode: bool,
    pub calendar_timeout_secs: u64,
    pub payment_timeout_secs: u64,
    pub pending_payment_ttl_minutes: i64,
    pub session_grace_hours: i64,
    pub session_sweep_interval_secs: u64,
    pub booking_expiry_sweep_interval_secs: u64,
    pub slot_retention_days: i64,
    pub slot_archive_sweep_interval_secs: u64,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
            supabase_jwt_secret: String::new(),
            google_calendar_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            razorpay_key_id: String::new(),
            razorpay_key_secret: String::new(),
            razorpay_base_url: "https://api.razorpay.com/v1".to_string(),
            payment_test_mode: false,
            calendar_timeout_secs: 5,
            payment_timeout_secs: 10,
            pending_payment_ttl_minutes: 15,
            session_grace_hours: 24,
            session_sweep_interval_secs: 300,
            booking_expiry_sweep_interval_secs: 60,
            slot_retention_days: 7,
            slot_archive_sweep_interval_secs: 86_400,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            google_calendar_base_url: env::var("GOOGLE_CALENDAR_BASE_URL")
                .unwrap_or_else(|_| defaults.google_calendar_base_url.clone()),
            razorpay_key_id: env::var("RAZORPAY_KEY_ID")
                .unwrap_or_else(|_| {
                    warn!("RAZORPAY_KEY_ID not set, using empty value");
                    String::new()
                }),
            razorpay_key_secret: env::var("RAZORPAY_KEY_SECRET")
                .unwrap_or_else(|_| {
                    warn!("RAZORPAY_KEY_SECRET not set, using empty value");
                    String::new()
                }),
            razorpay_base_url: env::var("RAZORPAY_BASE_URL")
                .unwrap_or_else(|_| defaults.razorpay_base_url.clone()),
            payment_test_mode: parse_var("PAYMENT_TEST_MODE", defaults.payment_test_mode),
            calendar_timeout_secs: parse_var("CALENDAR_TIMEOUT_SECS", defaults.calendar_timeout_secs),
            payment_timeout_secs: parse_var("PAYMENT_TIMEOUT_SECS", defaults.payment_timeout_secs),
            pending_payment_ttl_minutes: parse_var(
                "PENDING_PAYMENT_TTL_MINUTES",
                defaults.pending_payment_ttl_minutes,
            ),
            session_grace_hours: parse_var("SESSION_GRACE_HOURS", defaults.session_grace_hours),
            session_sweep_interval_secs: parse_var(
                "SESSION_SWEEP_INTERVAL_SECS",
                defaults.session_sweep_interval_secs,
            ),
            booking_expiry_sweep_interval_secs: parse_var(
                "BOOKING_EXPIRY_SWEEP_INTERVAL_SECS",
                defaults.booking_expiry_sweep_interval_secs,
            ),
            slot_retention_days: parse_var("SLOT_RETENTION_DAYS", defaults.slot_retention_days),
            slot_archive_sweep_interval_secs: parse_var(
                "SLOT_ARCHIVE_SWEEP_INTERVAL_SECS",
                defaults.slot_archive_sweep_interval_secs,
            ),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if config.payment_test_mode {
            warn!("PAYMENT_TEST_MODE enabled - payment verification is bypassed");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        self.payment_test_mode
            || (!self.razorpay_key_id.is_empty() && !self.razorpay_key_secret.is_empty())
    }

    pub fn calendar_timeout(&self) -> Duration {
        Duration::from_secs(self.calendar_timeout_secs)
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn pending_payment_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.pending_payment_ttl_minutes)
    }

    pub fn session_grace_period(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_grace_hours)
    }

    pub fn slot_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.slot_retention_days)
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("{} has invalid value '{}', using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();

        assert_eq!(config.session_grace_period(), chrono::Duration::hours(24));
        assert_eq!(config.pending_payment_ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.slot_retention(), chrono::Duration::days(7));
        assert!(!config.payment_test_mode);
        assert!(!config.is_configured());
    }

    #[test]
    fn test_payment_configured_in_test_mode() {
        let config = AppConfig {
            payment_test_mode: true,
            ..AppConfig::default()
        };
        assert!(config.is_payment_configured());
    }
}
