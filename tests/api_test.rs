//! HTTP API integration tests.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use pourhouse::club::signup::test::MockBillingSessionClient;
use pourhouse::club::{
    Customer, InMemoryLedgerStore, LedgerStore, Membership, MembershipStatus, SignupManager,
    StoredTier,
};
use pourhouse::{ApiState, router};

fn tier(id: &str, max: Option<u32>, monthly_pours: u32) -> StoredTier {
    let mut tier = StoredTier::new(id, id.to_uppercase());
    tier.max_subscriptions = max;
    tier.monthly_pours = monthly_pours;
    tier.provider_price_id = Some(format!("price_{}", id));
    tier
}

async fn seed_member(store: &InMemoryLedgerStore, customer_id: &str, tier_id: &str) {
    store
        .save_customer(&Customer::new(customer_id, "user_1", tier_id))
        .await
        .unwrap();

    let start = Utc::now() - Duration::days(1);
    store
        .save_membership(&Membership {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            tier_id: tier_id.to_string(),
            monthly_price_cents: 4900,
            status: MembershipStatus::Active,
            period_start: start,
            period_end: start + Duration::days(30),
            external_subscription_id: None,
            updated_at: start,
        })
        .await
        .unwrap();
}

fn app(store: Arc<InMemoryLedgerStore>) -> Router {
    let client = Arc::new(MockBillingSessionClient::new());
    let signups = SignupManager::new(Arc::clone(&store), client);
    router(ApiState::new(store, signups))
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn availability_lists_active_tiers_in_order() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let mut select = tier("select", None, 4);
    select.sort_order = 1;
    let mut reserve = tier("reserve", Some(10), 8);
    reserve.sort_order = 2;
    let mut retired = tier("retired", Some(5), 2);
    retired.is_active = false;
    store.seed_tiers(vec![select, reserve, retired]);
    let app = app(store);

    let (status, body) = send_get(&app, "/tiers/availability").await;
    assert_eq!(status, StatusCode::OK);

    let tiers = body["tiers"].as_array().unwrap();
    assert_eq!(tiers.len(), 2);
    assert_eq!(tiers[0]["tier_id"], "select");
    assert_eq!(tiers[1]["tier_id"], "reserve");
    assert_eq!(tiers[1]["available"], true);
}

#[tokio::test]
async fn reserve_reports_sold_out_without_error() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("elite", Some(1), 8)]);
    let app = app(store);

    let (status, body) = send_json(
        &app,
        "POST",
        "/tiers/elite/reserve",
        json!({ "user_id": "user_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["current"], 1);

    let (status, body) = send_json(
        &app,
        "POST",
        "/tiers/elite/reserve",
        json!({ "user_id": "user_2" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["current"], 1);
    assert_eq!(body["max"], 1);
}

#[tokio::test]
async fn reserve_unknown_tier_is_404() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let app = app(store);

    let (status, _) = send_json(
        &app,
        "POST",
        "/tiers/ghost/reserve",
        json!({ "user_id": "user_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signup_returns_checkout_url() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("select", None, 4)]);
    let app = app(store);

    let (status, body) = send_json(
        &app,
        "POST",
        "/signup",
        json!({
            "tier_id": "select",
            "user_id": "user_1",
            "email": "member@example.com",
            "success_url": "https://club.example.com/welcome",
            "cancel_url": "https://club.example.com/tiers"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "checkout_started");
    assert!(body["checkout_url"].as_str().unwrap().starts_with("https://"));
}

#[tokio::test]
async fn signup_on_full_tier_reports_tier_full() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let mut elite = tier("elite", Some(0), 8);
    elite.sort_order = 1;
    store.seed_tiers(vec![elite]);
    let app = app(store);

    let (status, body) = send_json(
        &app,
        "POST",
        "/signup",
        json!({
            "tier_id": "elite",
            "user_id": "user_1",
            "email": "member@example.com",
            "success_url": "https://club.example.com/welcome",
            "cancel_url": "https://club.example.com/tiers"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "tier_full");
    assert_eq!(body["current"], 0);
}

#[tokio::test]
async fn allowance_endpoint_reports_balance() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("select", None, 4)]);
    seed_member(&store, "cust_1", "select").await;
    let app = app(store);

    let (status, body) = send_get(&app, "/customers/cust_1/pours/available").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_pours"], 4);
    assert_eq!(body["pours_used"], 0);
    assert_eq!(body["tier_max_pours"], 4);
}

#[tokio::test]
async fn allowance_for_unknown_customer_is_404() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let app = app(store);

    let (status, body) = send_get(&app, "/customers/ghost/pours/available").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn record_pour_and_exhaust_quota() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("select", None, 4)]);
    seed_member(&store, "cust_1", "select").await;
    let app = app(store);

    let (status, body) = send_json(
        &app,
        "POST",
        "/customers/cust_1/pours",
        json!({ "quantity": 3, "location": "main_bar", "recorded_by": "staff_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 3);
    assert_eq!(body["status"], "redeemed");

    let (status, body) = send_json(
        &app,
        "POST",
        "/customers/cust_1/pours",
        json!({ "quantity": 2, "location": "main_bar", "recorded_by": "staff_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("only 1 remain this period"));
}

#[tokio::test]
async fn record_pour_rejects_unknown_location() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("select", None, 4)]);
    seed_member(&store, "cust_1", "select").await;
    let app = app(store);

    let (status, body) = send_json(
        &app,
        "POST",
        "/customers/cust_1/pours",
        json!({ "quantity": 1, "location": "rooftop", "recorded_by": "staff_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"].as_str().unwrap(),
        "Unknown pour location: 'rooftop'"
    );
}

#[tokio::test]
async fn reverse_pour_roundtrip() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("select", None, 4)]);
    seed_member(&store, "cust_1", "select").await;
    let app = app(store);

    let (_, recorded) = send_json(
        &app,
        "POST",
        "/customers/cust_1/pours",
        json!({ "quantity": 2, "location": "patio", "recorded_by": "staff_1" }),
    )
    .await;
    let pour_id = recorded["id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/pours/{}/reverse", pour_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reversed");

    // Second reversal is rejected
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/pours/{}/reverse", pour_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn idempotent_pour_replay_via_api() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.seed_tiers(vec![tier("select", None, 4)]);
    seed_member(&store, "cust_1", "select").await;
    let app = app(store);

    let reference = Uuid::new_v4();
    let payload = json!({
        "quantity": 2,
        "location": "main_bar",
        "recorded_by": "staff_1",
        "reference": reference
    });

    let (_, first) = send_json(&app, "POST", "/customers/cust_1/pours", payload.clone()).await;
    let (_, replay) = send_json(&app, "POST", "/customers/cust_1/pours", payload).await;
    assert_eq!(first["id"], replay["id"]);

    let (_, allowance) = send_get(&app, "/customers/cust_1/pours/available").await;
    assert_eq!(allowance["pours_used"], 2);
}
