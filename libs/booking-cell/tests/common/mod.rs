#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use booking_cell::{
    BookingService, CascadeDeletionCoordinator, OrderHandle, OrderRequest, PaymentError,
    PaymentEvidence, PaymentGateway, PaymentVerification,
};
use shared_database::{InMemorySchedulingStore, SchedulingStore};
use shared_models::scheduling::{AvailabilitySlot, Booking, NewSlot, PartnerFeeSettings, SlotStatus, TimeInterval};

#[derive(Default)]
pub struct FakeGateway {
    pub reject_signatures: AtomicBool,
    pub hang_on_verify: AtomicBool,
    pub fail_orders: AtomicBool,
    pub orders_created: AtomicUsize,
}

impl FakeGateway {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        let gateway = Self::default();
        gateway.reject_signatures.store(true, Ordering::SeqCst);
        gateway
    }

    pub fn hanging() -> Self {
        let gateway = Self::default();
        gateway.hang_on_verify.store(true, Ordering::SeqCst);
        gateway
    }

    /// Signature the fake accepts; it binds the payment to one order.
    pub fn sign(order_id: &str, payment_id: &str) -> String {
        format!("signed:{}|{}", order_id, payment_id)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<OrderHandle, PaymentError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(PaymentError::Api {
                status: 500,
                message: "gateway down".to_string(),
            });
        }
        let n = self.orders_created.fetch_add(1, Ordering::SeqCst);
        Ok(OrderHandle {
            id: format!("order_fake_{}", n),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            key_id: None,
        })
    }

    async fn verify_payment(
        &self,
        order_id: &str,
        evidence: &PaymentEvidence,
    ) -> Result<PaymentVerification, PaymentError> {
        if self.hang_on_verify.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let genuine = evidence.signature == Self::sign(order_id, &evidence.payment_id);
        Ok(PaymentVerification {
            verified: genuine && !self.reject_signatures.load(Ordering::SeqCst),
        })
    }
}

/// A genuine payment against `order_id`.
pub fn evidence(order_id: &str) -> PaymentEvidence {
    let payment_id = format!("pay_{}", order_id);
    PaymentEvidence {
        signature: FakeGateway::sign(order_id, &payment_id),
        payment_id,
    }
}

/// A genuine payment against the booking's upfront order.
pub fn evidence_for(booking: &Booking) -> PaymentEvidence {
    evidence(booking.order_id.as_deref().unwrap_or_default())
}

pub struct Harness {
    pub store: Arc<InMemorySchedulingStore>,
    pub gateway: Arc<FakeGateway>,
    pub bookings: Arc<BookingService>,
    pub cascade: Arc<CascadeDeletionCoordinator>,
}

pub fn harness(gateway: FakeGateway) -> Harness {
    harness_with_ttl(gateway, chrono::Duration::minutes(15))
}

pub fn harness_with_ttl(gateway: FakeGateway, hold_ttl: chrono::Duration) -> Harness {
    let store = Arc::new(InMemorySchedulingStore::new());
    let gateway = Arc::new(gateway);
    let dyn_store: Arc<dyn SchedulingStore> = store.clone();
    let bookings = Arc::new(BookingService::new(
        dyn_store.clone(),
        gateway.clone(),
        Duration::from_millis(100),
        hold_ttl,
    ));
    let cascade = Arc::new(CascadeDeletionCoordinator::new(dyn_store));
    Harness {
        store,
        gateway,
        bookings,
        cascade,
    }
}

impl Harness {
    /// A published slot starting tomorrow.
    pub async fn published_slot(&self, partner_id: Uuid, status: SlotStatus) -> AvailabilitySlot {
        let start = Utc::now() + chrono::Duration::days(1);
        self.published_slot_at(partner_id, status, start, 60).await
    }

    pub async fn published_slot_at(
        &self,
        partner_id: Uuid,
        status: SlotStatus,
        start: DateTime<Utc>,
        minutes: i64,
    ) -> AvailabilitySlot {
        let slot = self
            .store
            .insert_slot(NewSlot {
                partner_id,
                interval: TimeInterval::new(start, start + chrono::Duration::minutes(minutes)).unwrap(),
                timezone: "Asia/Kolkata".to_string(),
                status,
            })
            .await
            .unwrap();
        let published = self
            .store
            .publish_slots(partner_id, Some(vec![slot.id]), Utc::now())
            .await
            .unwrap();
        published.into_iter().next().unwrap()
    }

    pub fn set_fees(&self, partner_id: Uuid, session_fee: Option<i64>, booking_fee: Option<i64>) {
        self.store.set_fee_settings(PartnerFeeSettings {
            partner_id,
            session_fee,
            booking_fee,
            currency: "INR".to_string(),
        });
    }
}
