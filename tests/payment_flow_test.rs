use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::str::FromStr;
use tower::ServiceExt;

use momo_core::config::Config;
use momo_core::domain::{Provider, TransactionState};
use momo_core::ports::{PayoutRoute, TransactionRepository};
use momo_core::providers::ProviderStatus;
use momo_core::{create_app, AppState, SandboxHandles};

fn test_config() -> Config {
    Config {
        server_port: 0,
        breaker_failure_threshold: 5,
        breaker_open_timeout_secs: 60,
        // Long enough that background retry timers never fire mid-test.
        retry_base_delay_secs: 3600,
        retry_max_attempts: 3,
        adapter_timeout_secs: 30,
    }
}

fn test_app() -> (Router, SandboxHandles) {
    let (state, handles) = AppState::sandbox(&test_config());
    (create_app(state), handles)
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

#[tokio::test]
async fn momo_collection_completes_and_pays_the_driver() {
    let (app, handles) = test_app();
    handles
        .ride_hooks
        .register_route(
            "RIDE-1",
            PayoutRoute {
                provider: Provider::Airtel,
                driver_phone: "+250731234567".to_string(),
            },
        )
        .await;

    let (status, body) = post_json(
        &app,
        "/payments/process",
        json!({
            "rideId": "RIDE-1",
            "paymentMethod": "mtn_momo",
            "phoneNumber": "+250781234567",
            "amount": 2000,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "processing");
    let reference = body["providerReference"].as_str().unwrap().to_string();
    assert!(reference.starts_with("MTN-"));

    // Provider confirms asynchronously.
    let (status, body) = post_json(
        &app,
        "/payments/webhooks/mtn",
        json!({ "referenceId": reference, "status": "SUCCESSFUL" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");

    // Collection is terminal and the ride heard about it.
    let collection = handles
        .repository
        .find_by_idempotency_key("RIDE-1-collection")
        .await
        .unwrap()
        .expect("collection exists");
    assert_eq!(collection.state, TransactionState::Completed);
    let settled = handles.ride_hooks.settled().await;
    assert!(settled.contains(&("RIDE-1".to_string(), "completed".to_string())));

    // Driver disbursement went out through Airtel at fare minus commission.
    let payout = handles
        .repository
        .find_by_idempotency_key("RIDE-1-disbursement")
        .await
        .unwrap()
        .expect("disbursement exists");
    assert_eq!(payout.provider, Provider::Airtel);
    assert_eq!(payout.amount, BigDecimal::from_str("1600.00").unwrap());
    assert_eq!(payout.state, TransactionState::PendingConfirmation);
    assert_eq!(payout.counterparty_phone, "+250731234567");
}

#[tokio::test]
async fn cash_payment_completes_immediately() {
    let (app, handles) = test_app();
    handles
        .ride_hooks
        .register_route(
            "RIDE-2",
            PayoutRoute {
                provider: Provider::Cash,
                driver_phone: "+250781111111".to_string(),
            },
        )
        .await;

    let (status, body) = post_json(
        &app,
        "/payments/process",
        json!({
            "rideId": "RIDE-2",
            "paymentMethod": "cash",
            "phoneNumber": "+250781234567",
            "amount": 5000,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["success"], true);

    // Driver earnings accumulate on the weekly cash ledger.
    let entries = handles.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "RIDE-2");
    assert_eq!(entries[0].2, BigDecimal::from_str("4000.00").unwrap());
}

#[tokio::test]
async fn invalid_phone_number_is_rejected() {
    let (app, _handles) = test_app();
    let (status, body) = post_json(
        &app,
        "/payments/process",
        json!({
            "paymentMethod": "mtn_momo",
            "phoneNumber": "0781234567",
            "amount": 2000,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("phone_number"));
}

#[tokio::test]
async fn amount_out_of_bounds_is_rejected() {
    let (app, _handles) = test_app();
    for amount in [100, 200_000] {
        let (status, _) = post_json(
            &app,
            "/payments/process",
            json!({
                "paymentMethod": "mtn_momo",
                "phoneNumber": "+250781234567",
                "amount": amount,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn burst_from_one_phone_hits_rate_limit() {
    let (app, _handles) = test_app();
    let mut last_status = StatusCode::CREATED;
    for i in 0..11 {
        let (status, _) = post_json(
            &app,
            "/payments/process",
            json!({
                "rideId": format!("RIDE-BURST-{i}"),
                "paymentMethod": "mtn_momo",
                "phoneNumber": "+250789999999",
                "amount": 1000,
            }),
        )
        .await;
        last_status = status;
        if status == StatusCode::TOO_MANY_REQUESTS {
            break;
        }
    }
    assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn status_endpoint_polls_the_provider() {
    let (app, handles) = test_app();
    let (_, body) = post_json(
        &app,
        "/payments/process",
        json!({
            "paymentMethod": "mtn_momo",
            "phoneNumber": "+250781234567",
            "amount": 2000,
        }),
    )
    .await;
    let id = body["transactionId"].as_str().unwrap().to_string();
    let reference = body["providerReference"].as_str().unwrap().to_string();

    // Still awaiting confirmation.
    let (status, body) = get_json(&app, &format!("/payments/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");

    // The provider settled but its webhook never arrived; the poll catches up.
    handles.mtn.resolve(&reference, ProviderStatus::Successful).await;
    let (status, body) = get_json(&app, &format!("/payments/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let (app, _handles) = test_app();
    let (status, _) = get_json(
        &app,
        "/payments/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_is_refused_once_dispatched() {
    let (app, _handles) = test_app();
    let (_, body) = post_json(
        &app,
        "/payments/process",
        json!({
            "paymentMethod": "mtn_momo",
            "phoneNumber": "+250781234567",
            "amount": 2000,
        }),
    )
    .await;
    let id = body["transactionId"].as_str().unwrap().to_string();

    let (status, _) = post_json(&app, &format!("/payments/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _handles) = test_app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
