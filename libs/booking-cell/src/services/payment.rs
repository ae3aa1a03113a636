// libs/booking-cell/src/services/payment.rs
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::PaymentEvidence;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PaymentError {
    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Gateway API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Gateway response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PaymentError::Decode(err.to_string())
        } else {
            PaymentError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: Value,
}

/// Opaque gateway order handed to the client checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHandle {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    /// Public key the checkout widget needs.
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentVerification {
    pub verified: bool,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<OrderHandle, PaymentError>;

    async fn verify_payment(
        &self,
        order_id: &str,
        evidence: &PaymentEvidence,
    ) -> Result<PaymentVerification, PaymentError>;
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
}

/// Razorpay orders API. In test mode no request leaves the process: orders
/// get a local handle and every payment verifies.
pub struct RazorpayGateway {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    test_mode: bool,
}

impl RazorpayGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.razorpay_base_url.trim_end_matches('/').to_string(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            test_mode: config.payment_test_mode,
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Hex HMAC-SHA256 of `order_id|payment_id` keyed with the key secret.
    pub fn expected_signature(&self, order_id: &str, payment_id: &str) -> Result<String, PaymentError> {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .map_err(|_| PaymentError::NotConfigured)?;
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, request), fields(amount = request.amount, receipt = %request.receipt))]
    async fn create_order(&self, request: OrderRequest) -> Result<OrderHandle, PaymentError> {
        if self.test_mode {
            let id = format!("order_test_{}", Uuid::new_v4().simple());
            debug!("Test mode: issuing local order {}", id);
            return Ok(OrderHandle {
                id,
                amount: request.amount,
                currency: request.currency,
                receipt: Some(request.receipt),
                key_id: Some(self.key_id.clone()),
            });
        }

        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(PaymentError::NotConfigured);
        }

        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": request.amount,
                "currency": request.currency,
                "receipt": request.receipt,
                "notes": request.notes,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Razorpay order creation failed ({}): {}", status, message);
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let order: RazorpayOrder = response.json().await?;
        debug!("Created Razorpay order {}", order.id);

        Ok(OrderHandle {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            key_id: Some(self.key_id.clone()),
        })
    }

    async fn verify_payment(
        &self,
        order_id: &str,
        evidence: &PaymentEvidence,
    ) -> Result<PaymentVerification, PaymentError> {
        if self.test_mode {
            debug!("Test mode: accepting payment {} for order {}", evidence.payment_id, order_id);
            return Ok(PaymentVerification { verified: true });
        }
        if self.key_secret.is_empty() {
            return Err(PaymentError::NotConfigured);
        }

        let Ok(supplied) = hex::decode(evidence.signature.trim()) else {
            warn!("Payment signature for order {} is not hex", order_id);
            return Ok(PaymentVerification { verified: false });
        };

        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .map_err(|_| PaymentError::NotConfigured)?;
        mac.update(format!("{}|{}", order_id, evidence.payment_id).as_bytes());
        let verified = mac.verify_slice(&supplied).is_ok();

        if !verified {
            warn!("Payment signature mismatch for order {}", order_id);
        }
        Ok(PaymentVerification { verified })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(test_mode: bool) -> RazorpayGateway {
        let config = AppConfig {
            razorpay_key_id: "rzp_live_key".to_string(),
            razorpay_key_secret: "topsecret".to_string(),
            payment_test_mode: test_mode,
            ..AppConfig::default()
        };
        RazorpayGateway::new(&config)
    }

    #[tokio::test]
    async fn test_valid_signature_verifies() {
        let gateway = gateway(false);
        let signature = gateway.expected_signature("order_1", "pay_1").unwrap();
        let evidence = PaymentEvidence {
            payment_id: "pay_1".to_string(),
            signature,
        };

        let result = gateway.verify_payment("order_1", &evidence).await.unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_signature_for_other_order_is_rejected() {
        let gateway = gateway(false);
        let signature = gateway.expected_signature("order_other", "pay_1").unwrap();
        let evidence = PaymentEvidence {
            payment_id: "pay_1".to_string(),
            signature,
        };

        let result = gateway.verify_payment("order_1", &evidence).await.unwrap();
        assert!(!result.verified);

        let garbage = PaymentEvidence {
            payment_id: "pay_1".to_string(),
            signature: "not-hex".to_string(),
        };
        assert!(!gateway.verify_payment("order_1", &garbage).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_mode_is_explicit_and_offline() {
        let gateway = gateway(true);
        assert!(gateway.is_test_mode());

        let order = gateway
            .create_order(OrderRequest {
                amount: 50_000,
                currency: "INR".to_string(),
                receipt: "booking_test".to_string(),
                notes: json!({}),
            })
            .await
            .unwrap();
        assert!(order.id.starts_with("order_test_"));

        let evidence = PaymentEvidence {
            payment_id: "pay_x".to_string(),
            signature: "anything".to_string(),
        };
        assert!(gateway.verify_payment(&order.id, &evidence).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_live_key_prefix_does_not_imply_test_mode() {
        let config = AppConfig {
            razorpay_key_id: "rzp_test_abc".to_string(),
            razorpay_key_secret: "secret".to_string(),
            ..AppConfig::default()
        };
        let gateway = RazorpayGateway::new(&config);
        assert!(!gateway.is_test_mode());

        let evidence = PaymentEvidence {
            payment_id: "pay_x".to_string(),
            signature: "00".to_string(),
        };
        assert!(!gateway.verify_payment("order_1", &evidence).await.unwrap().verified);
    }
}
