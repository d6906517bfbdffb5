//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use relay_server::config::Config;
use relay_server::http::router;
use relay_server::server::build_state;
use relay_server::types::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, AppState) {
    let mut config = Config::default();
    config.groups.insert("team".into(), vec!["alice".into(), "bob".into()]);
    let state = build_state(config).unwrap();
    (router(state.clone()), state)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn submit_to_offline_recipient_is_logged() {
    let (app, state) = app();

    let (status, body) = send(
        app,
        post_json("/api/messages", json!({"sender": "alice", "recipient": "bob", "text": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"]["sender"], "alice");
    assert_eq!(body["message"]["recipient"], "bob");
    assert_eq!(body["message"]["text"], "hi");
    assert_eq!(body["message"]["seq"], 1);
    assert_eq!(body["delivered"], 0);
    assert_eq!(body["recipientOnline"], false);
    assert_eq!(state.relay.log().len(), 1);
}

#[tokio::test]
async fn submit_without_recipient_is_broadcast() {
    let (app, _state) = app();

    let (status, body) = send(app, post_json("/api/messages", json!({"sender": "alice", "text": "all"}))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["recipient"], "*");
}

#[tokio::test]
async fn submit_to_group() {
    let (app, _state) = app();

    let (status, body) = send(
        app,
        post_json("/api/messages", json!({"sender": "alice", "recipient": "#team", "text": "standup"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["recipient"], "#team");
}

#[tokio::test]
async fn invalid_submissions_are_400_and_not_logged() {
    let cases = [
        json!({"sender": "alice", "recipient": "bob", "text": "   "}),
        json!({"sender": "", "recipient": "bob", "text": "hi"}),
        json!({"sender": "alice", "recipient": "bad id", "text": "hi"}),
        json!({"sender": "alice", "recipient": "#nobody", "text": "hi"}),
        json!({"sender": "alice", "recipient": "bob", "text": "x".repeat(5000)}),
    ];

    for case in cases {
        let (app, state) = app();
        let (status, body) = send(app, post_json("/api/messages", case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case {}", case);
        assert!(body["error"].as_str().unwrap().starts_with("invalid message"), "case {}", case);
        assert!(state.relay.log().is_empty());
    }
}

#[tokio::test]
async fn malformed_json_is_400() {
    let (app, _state) = app();

    let req = Request::post("/api/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_fields_are_400() {
    let (app, _state) = app();

    let (status, body) = send(app, post_json("/api/messages", json!({"recipient": "bob"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn presence_of_offline_participant() {
    let (app, _state) = app();

    let (status, body) = send(app, get("/api/presence/bob")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"participant": "bob", "online": false, "connections": 0}));
}

#[tokio::test]
async fn presence_counts_live_connections() {
    let (app, state) = app();
    let (tx, _rx) = relay_core::outbound_channel(4);
    let handle = relay_core::ConnectionHandle::new(relay_core::ConnectionId(7), &tx);
    state.lifecycle.connect(handle.id());
    state.lifecycle.open(handle, "bob", 0).await.unwrap();

    let (status, body) = send(app, get("/api/presence/bob")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert_eq!(body["connections"], 1);
}

#[tokio::test]
async fn presence_of_invalid_id_is_400() {
    let (app, _state) = app();

    let (status, body) = send(app, get("/api/presence/%23team")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid participant"));
}

#[tokio::test]
async fn health_reports_counters() {
    let (app, state) = app();
    state.relay.submit("alice", Some("bob"), "one").await.unwrap();
    state.relay.submit("bob", Some("alice"), "two").await.unwrap();

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ok", "connections": 0, "participants": 0, "messages": 2})
    );
}

#[tokio::test]
async fn socket_without_user_is_400() {
    let (app, _state) = app();

    let (status, body) = send(app, get("/socket")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing user");
}

#[tokio::test]
async fn socket_with_invalid_user_is_400() {
    let (app, _state) = app();

    let (status, body) = send(app, get("/socket?user=*")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid user"));
}

#[tokio::test]
async fn socket_with_bad_since_is_400() {
    let (app, _state) = app();

    let (status, body) = send(app, get("/socket?user=alice&since=yesterday")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
