pub mod booking;
pub mod cascade;
pub mod payment;

pub use booking::{BookingService, ExpirePendingBookingsSweep};
pub use cascade::CascadeDeletionCoordinator;
pub use payment::{
    OrderHandle, OrderRequest, PaymentError, PaymentGateway, PaymentVerification, RazorpayGateway,
};
