//! Scenario: the HTTP surface over an in-memory store.
//!
//! Drives the full router in-process: login, booking, approval, payment,
//! case work and the dashboard, plus the authorisation and error mapping.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // oneshot
use uuid::Uuid;

use counsel_server::auth::hash_password;
use counsel_server::clock::ManualClock;
use counsel_server::config::LifecycleConfig;
use counsel_server::db::MemoryStore;
use counsel_server::engine::LifecycleEngine;
use counsel_server::models::{AccountRow, ActorRole, AppState};
use counsel_server::routes;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    lawyer_id: Uuid,
}

fn account(email: &str, role: ActorRole) -> AccountRow {
    AccountRow {
        account_id: Uuid::new_v4(),
        email: email.into(),
        display_name: email.into(),
        password_hash: hash_password("pw").unwrap(),
        role,
        is_active: true,
    }
}

fn harness() -> Harness {
    harness_with_ttl(24)
}

fn harness_with_ttl(session_ttl_hours: i64) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 9, 14, 8, 0, 0).unwrap()));
    let engine = Arc::new(LifecycleEngine::new(clock.clone(), LifecycleConfig::default()));

    let store = MemoryStore::new();
    let lawyer = account("lawyer@firm.test", ActorRole::Lawyer);
    let lawyer_id = lawyer.account_id;
    store.insert_account(lawyer);
    store.insert_account(account("other@firm.test", ActorRole::Lawyer));
    store.insert_account(account("client@home.test", ActorRole::Client));
    store.insert_account(account("stranger@home.test", ActorRole::Client));

    let state = AppState {
        engine,
        store: Arc::new(store),
        session_ttl_hours,
    };
    Harness {
        app: routes::router(state),
        clock,
        lawyer_id,
    }
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

async fn login(app: &Router, email: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["data"]["access_token"].as_str().unwrap().to_string()
}

async fn book(h: &Harness, client: &str) -> String {
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/v1/appointments",
        Some(client),
        Some(json!({
            "lawyer_id": h.lawyer_id,
            "consultation_type": "video",
            "case_type": "Employment",
            "description": "Wrongful dismissal",
            "selected_date": "2026-09-16",
            "selected_time": "14:30:00",
            "consultation_fee": 4500
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "booking failed: {body}");
    assert_eq!(body["data"]["status"], "PENDING_LAWYER_APPROVAL");
    body["data"]["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, body) = call(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ok"], true);
}

#[tokio::test]
async fn login_me_logout() {
    let h = harness();

    let (status, body) = call(
        &h.app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "client@home.test", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    let token = login(&h.app, "CLIENT@home.test").await;
    let (status, body) = call(&h.app, "GET", "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["account"]["role"], "client");

    let (status, _) = call(&h.app, "POST", "/api/v1/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&h.app, "GET", "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn unrepresentable_session_expiry_is_an_error_not_a_crash() {
    let h = harness_with_ttl(i64::MAX);
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "client@home.test", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL");
}

#[tokio::test]
async fn sessions_expire_with_the_clock() {
    let h = harness();
    let token = login(&h.app, "client@home.test").await;
    h.clock.advance(Duration::hours(24));
    let (status, _) = call(&h.app, "GET", "/api/v1/appointments", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let h = harness();
    let (status, _) = call(&h.app, "GET", "/api/v1/cases", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Lifecycle over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consultation_to_case_over_http() {
    let h = harness();
    let client = login(&h.app, "client@home.test").await;
    let lawyer = login(&h.app, "lawyer@firm.test").await;

    let appointment_id = book(&h, &client).await;

    let (status, body) = call(
        &h.app,
        "GET",
        &format!("/api/v1/appointments/{appointment_id}/deadline"),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kind"], "lawyer_approval");
    assert_eq!(body["data"]["urgency"], "normal");

    h.clock.advance(Duration::hours(1));
    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{appointment_id}/approve"),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["appointment"]["status"], "APPROVED_AWAITING_PAYMENT");
    let payment_id = body["data"]["payment"]["id"].as_str().unwrap().to_string();

    // the lawyer cannot pay on the client's behalf
    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/payments/{payment_id}/confirm"),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/payments/{payment_id}/confirm"),
        Some(&client),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SUCCESS");

    let (status, _) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{appointment_id}/complete"),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let start = json!({
        "appointment_id": appointment_id,
        "title": "Tribunal claim",
        "total_fees": 30000
    });
    let (status, body) = call(&h.app, "POST", "/api/v1/cases", Some(&lawyer), Some(start.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "ACTIVE");
    assert_eq!(body["data"]["case_type"], "Employment");
    let case_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&h.app, "POST", "/api/v1/cases", Some(&lawyer), Some(start)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_CASE");

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/cases/{case_id}/messages"),
        Some(&client),
        Some(json!({ "body": "Attached my contract." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["messages"][0]["body"], "Attached my contract.");

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/cases/{case_id}/payments"),
        Some(&lawyer),
        Some(json!({ "amount": 15000, "description": "Filing fee" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["target"]["case"], case_id.as_str());

    let (status, body) = call(&h.app, "GET", "/api/v1/dashboard", Some(&lawyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["counts"]["payment_pending_cases"], 1);
    assert_eq!(body["data"]["deadlines"][0]["kind"], "case_payment");

    let (status, body) = call(&h.app, "GET", "/api/v1/payments", Some(&client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn strangers_cannot_touch_other_peoples_records() {
    let h = harness();
    let client = login(&h.app, "client@home.test").await;
    let stranger = login(&h.app, "stranger@home.test").await;
    let other_lawyer = login(&h.app, "other@firm.test").await;

    let appointment_id = book(&h, &client).await;

    let (status, _) = call(
        &h.app,
        "GET",
        &format!("/api/v1/appointments/{appointment_id}"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{appointment_id}/approve"),
        Some(&other_lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&h.app, "GET", "/api/v1/appointments", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn engine_errors_map_to_http_statuses() {
    let h = harness();
    let client = login(&h.app, "client@home.test").await;
    let lawyer = login(&h.app, "lawyer@firm.test").await;

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{}/approve", Uuid::new_v4()),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let appointment_id = book(&h, &client).await;
    h.clock.advance(Duration::hours(25));

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{appointment_id}/approve"),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "lawyer session outlived: {body}");

    let lawyer = login(&h.app, "lawyer@firm.test").await;
    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{appointment_id}/approve"),
        Some(&lawyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DEADLINE_PASSED");

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/api/v1/appointments/{appointment_id}/decline"),
        Some(&lawyer),
        Some(json!({ "reason": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn booking_requires_a_real_lawyer() {
    let h = harness();
    let client = login(&h.app, "client@home.test").await;
    let (status, _) = call(
        &h.app,
        "POST",
        "/api/v1/appointments",
        Some(&client),
        Some(json!({
            "lawyer_id": Uuid::new_v4(),
            "consultation_type": "phone",
            "case_type": "Tax",
            "description": "Audit letter",
            "selected_date": "2026-09-20",
            "selected_time": "09:00:00",
            "consultation_fee": 2000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
