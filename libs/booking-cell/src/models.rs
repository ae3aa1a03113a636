// libs/booking-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, AvailabilitySlot, Booking, BookingChannel};

use crate::services::payment::{OrderHandle, PaymentError};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptBookingRequest {
    pub slot_id: Uuid,
}

/// Public booking flow: the caller is not signed in and names the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicBookingRequest {
    pub slot_id: Uuid,
    pub client_id: Uuid,
}

/// Proof of payment returned by the gateway checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvidence {
    pub payment_id: String,
    pub signature: String,
}

// ==============================================================================
// RESULT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResult {
    pub booking: Booking,
    pub slot: AvailabilitySlot,
    #[serde(default)]
    pub appointment: Option<Appointment>,
    /// Present while payment is outstanding.
    #[serde(default)]
    pub order: Option<OrderHandle>,
    pub channel: BookingChannel,
}

impl BookingResult {
    pub fn requires_payment(&self) -> bool {
        self.order.is_some() && self.appointment.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingPayment {
    pub booking: Booking,
    pub order: OrderHandle,
    pub amount: i64,
}

/// What a slot deletion or booking cancellation removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeResult {
    pub slot_id: Uuid,
    pub slot_deleted: bool,
    #[serde(default)]
    pub booking: Option<Booking>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    /// Money was collected for the removed booking and must be refunded by hand.
    pub requires_refund_attention: bool,
    pub amount_paid: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum BookingError {
    #[error("Slot not found")]
    SlotNotFound,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Slot unavailable: {reason}")]
    SlotUnavailable {
        reason: String,
        requires_refund_attention: bool,
    },

    #[error("Payment verification failed")]
    PaymentVerificationFailed,

    #[error("Payment verification timed out")]
    PaymentVerificationTimeout,

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Nothing left to pay on this booking")]
    NothingToPay,

    #[error("Booking cannot be changed in its current state: {0}")]
    InvalidState(String),

    #[error("Unauthorized access to booking")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl BookingError {
    pub fn slot_taken(reason: impl Into<String>) -> Self {
        BookingError::SlotUnavailable {
            reason: reason.into(),
            requires_refund_attention: false,
        }
    }

    pub fn slot_lost_after_payment(reason: impl Into<String>) -> Self {
        BookingError::SlotUnavailable {
            reason: reason.into(),
            requires_refund_attention: true,
        }
    }

    pub fn requires_refund_attention(&self) -> bool {
        matches!(
            self,
            BookingError::SlotUnavailable {
                requires_refund_attention: true,
                ..
            }
        )
    }
}

impl From<DatabaseError> for BookingError {
    fn from(err: DatabaseError) -> Self {
        BookingError::DatabaseError(err.to_string())
    }
}

impl From<PaymentError> for BookingError {
    fn from(err: PaymentError) -> Self {
        BookingError::PaymentGateway(err.to_string())
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotNotFound | BookingError::BookingNotFound => {
                AppError::NotFound(err.to_string())
            }
            BookingError::SlotUnavailable {
                ref reason,
                requires_refund_attention,
            } => {
                if requires_refund_attention {
                    AppError::Conflict(format!(
                        "Slot unavailable: {}; payment was collected and requires refund attention",
                        reason
                    ))
                } else {
                    AppError::Conflict(err.to_string())
                }
            }
            BookingError::PaymentVerificationFailed => AppError::PaymentRequired(err.to_string()),
            BookingError::PaymentVerificationTimeout | BookingError::PaymentGateway(_) => {
                AppError::ExternalService(err.to_string())
            }
            BookingError::NothingToPay | BookingError::InvalidState(_) => {
                AppError::BadRequest(err.to_string())
            }
            BookingError::Unauthorized => AppError::Forbidden(err.to_string()),
            BookingError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
