//! End-to-end tests using a real WebSocket client.

use std::time::Duration;

use futures::StreamExt;
use relay_core::ParticipantId;
use relay_protocol::decode_push;
use relay_protocol::wire_types::PushFrame;
use relay_server::config::Config;
use relay_server::server::{build_state, serve};
use relay_server::types::AppState;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a server on an ephemeral port and return its address + state.
async fn boot_server() -> (String, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = build_state(Config::default()).unwrap();

    let serving = state.clone();
    tokio::spawn(async move {
        let _ = serve(serving, listener, None).await;
    });

    (addr, state)
}

async fn connect(addr: &str, query: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{}/socket?{}", addr, query)))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn wait_for_connections(state: &AppState, who: &str, expected: usize) {
    let id = ParticipantId::parse(who).unwrap();
    timeout(TIMEOUT, async {
        while state.relay.registry().resolve(&id).len() != expected {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry never reached the expected connection count");
}

async fn next_frame(ws: &mut WsStream) -> PushFrame {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("no frame before timeout")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return decode_push(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut WsStream) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_millis(150), ws.next()).await {
        panic!("unexpected frame: {}", text.as_str());
    }
}

#[tokio::test]
async fn live_message_is_pushed() {
    let (addr, state) = boot_server().await;
    let mut bob = connect(&addr, "user=bob").await;
    wait_for_connections(&state, "bob", 1).await;

    let report = state.relay.submit("alice", Some("bob"), "hello bob").await.unwrap();
    assert!(report.recipient_online);
    assert_eq!(report.delivered_to.len(), 1);

    let frame = next_frame(&mut bob).await;
    assert_eq!(frame.event, "newMessage");
    assert_eq!(frame.data.sender, "alice");
    assert_eq!(frame.data.text, "hello bob");
    assert_eq!(frame.data.time, report.message.time);
}

#[tokio::test]
async fn offline_message_is_replayed_on_connect() {
    let (addr, state) = boot_server().await;
    let report = state.relay.submit("alice", Some("bob"), "while you were out").await.unwrap();
    assert!(!report.recipient_online);

    let mut bob = connect(&addr, "user=bob").await;
    let frame = next_frame(&mut bob).await;
    assert_eq!(frame.data.sender, "alice");
    assert_eq!(frame.data.text, "while you were out");

    // Replayed once, not again as a live push.
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn replay_honours_since() {
    let (addr, state) = boot_server().await;
    let first = state.relay.submit("alice", Some("bob"), "old").await.unwrap();
    sleep(Duration::from_millis(5)).await;
    state.relay.submit("alice", Some("bob"), "new").await.unwrap();

    let mut bob = connect(&addr, &format!("user=bob&since={}", first.message.time)).await;
    let frame = next_frame(&mut bob).await;
    assert_eq!(frame.data.text, "new");
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn every_connection_of_a_participant_receives() {
    let (addr, state) = boot_server().await;
    let mut phone = connect(&addr, "user=bob").await;
    let mut laptop = connect(&addr, "user=bob").await;
    wait_for_connections(&state, "bob", 2).await;

    state.relay.submit("alice", Some("bob"), "both of you").await.unwrap();

    assert_eq!(next_frame(&mut phone).await.data.text, "both of you");
    assert_eq!(next_frame(&mut laptop).await.data.text, "both of you");
}

#[tokio::test]
async fn closing_one_connection_keeps_the_other() {
    let (addr, state) = boot_server().await;
    let mut phone = connect(&addr, "user=bob").await;
    let mut laptop = connect(&addr, "user=bob").await;
    wait_for_connections(&state, "bob", 2).await;

    phone.close(None).await.unwrap();
    wait_for_connections(&state, "bob", 1).await;

    let report = state.relay.submit("alice", Some("bob"), "still here?").await.unwrap();
    assert!(report.recipient_online);
    assert_eq!(next_frame(&mut laptop).await.data.text, "still here?");
}

#[tokio::test]
async fn sender_sees_own_message_when_echo_enabled() {
    let (addr, state) = boot_server().await;
    let mut alice = connect(&addr, "user=alice").await;
    let mut bob = connect(&addr, "user=bob").await;
    wait_for_connections(&state, "alice", 1).await;
    wait_for_connections(&state, "bob", 1).await;

    state.relay.submit("alice", Some("bob"), "ping").await.unwrap();

    assert_eq!(next_frame(&mut bob).await.data.text, "ping");
    let echo = next_frame(&mut alice).await;
    assert_eq!(echo.data.sender, "alice");
    assert_eq!(echo.data.text, "ping");
}

#[tokio::test]
async fn disconnect_takes_participant_offline() {
    let (addr, state) = boot_server().await;
    let bob = connect(&addr, "user=bob").await;
    wait_for_connections(&state, "bob", 1).await;

    drop(bob);
    wait_for_connections(&state, "bob", 0).await;

    let report = state.relay.submit("alice", Some("bob"), "gone").await.unwrap();
    assert!(!report.recipient_online);
    assert_eq!(state.relay.log().len(), 1);
}

#[tokio::test]
async fn text_needing_json_escapes_is_pushed_intact() {
    let (addr, state) = boot_server().await;
    let mut bob = connect(&addr, "user=bob").await;
    wait_for_connections(&state, "bob", 1).await;

    let text = "quote \" backslash \\ tab \t newline \n emoji 🦀 nul-ish \u{1}";
    let report = state.relay.submit("alice", Some("bob"), text).await.unwrap();
    assert_eq!(report.delivered_to.len(), 1);
    assert!(report.failures.is_empty());

    let frame = next_frame(&mut bob).await;
    assert_eq!(frame.data.text, text);
}
