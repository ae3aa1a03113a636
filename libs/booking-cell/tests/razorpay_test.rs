use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::{OrderRequest, PaymentError, PaymentGateway, RazorpayGateway};
use shared_utils::test_utils::TestConfig;

fn gateway_for(server: &MockServer) -> RazorpayGateway {
    let mut config = TestConfig::default().to_app_config();
    config.razorpay_base_url = server.uri();
    RazorpayGateway::new(&config)
}

fn order_request() -> OrderRequest {
    OrderRequest {
        amount: 50_000,
        currency: "INR".to_string(),
        receipt: "booking_slot_1700000000".to_string(),
        notes: json!({ "payment_type": "session_fee" }),
    }
}

#[tokio::test]
async fn test_create_order_posts_to_orders_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "amount": 50000,
            "currency": "INR",
            "receipt": "booking_slot_1700000000"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_LiveAbc123",
            "entity": "order",
            "amount": 50000,
            "currency": "INR",
            "receipt": "booking_slot_1700000000",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = gateway_for(&server).create_order(order_request()).await.unwrap();

    assert_eq!(order.id, "order_LiveAbc123");
    assert_eq!(order.amount, 50_000);
    assert_eq!(order.key_id.as_deref(), Some("rzp_test_key"));
}

#[tokio::test]
async fn test_gateway_rejection_is_an_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "amount too small" }
        })))
        .mount(&server)
        .await;

    let result = gateway_for(&server).create_order(order_request()).await;
    assert_matches!(result, Err(PaymentError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_missing_credentials_are_reported() {
    let server = MockServer::start().await;
    let mut config = TestConfig::default().to_app_config();
    config.razorpay_base_url = server.uri();
    config.razorpay_key_secret = String::new();

    let result = RazorpayGateway::new(&config).create_order(order_request()).await;
    assert_matches!(result, Err(PaymentError::NotConfigured));
}
