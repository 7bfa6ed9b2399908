//! End-to-end scenario 6 (spec.md §8): `/sendsms` validation rejects a
//! garbage `to` field and an out-of-range `mwi` field with 400s.

mod support;

use smsbox::http::auth::{CredentialValidator, StaticTableValidator};
use smsbox::http::{build_router, HttpState};
use std::net::SocketAddr;
use std::sync::Arc;
use support::test_state;

async fn spawn_server() -> SocketAddr {
    let (state, _fake_bearerbox) = test_state(
        r#"
        [[translation]]
        name = "tester"
        password = "secret"
        type = "text"
        pattern = "pong"
        "#,
    );

    let validator: Arc<dyn CredentialValidator> = Arc::new(StaticTableValidator::new(Default::default()));
    let http_state = HttpState { app: state, validator };
    let router = build_router(http_state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn garbage_to_field_is_rejected_with_400() {
    let addr = spawn_server().await;
    let url = format!(
        "http://{addr}/sendsms?username=tester&password=secret&from=%2B1&to=%2B1-800-bad&text=hi"
    );
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Garbage 'to' field"), "unexpected body: {body}");
}

#[tokio::test]
async fn out_of_range_mwi_is_rejected_with_400() {
    let addr = spawn_server().await;
    let url = format!(
        "http://{addr}/sendsms?username=tester&password=secret&from=%2B1&to=%2B1800&text=hi&mwi=9"
    );
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body = resp.text().await.unwrap();
    assert!(body.contains("MWI field misformed"), "unexpected body: {body}");
}
