//! WebSocket transport.
//!
//! Clients connect to `GET /socket?user=<participant>[&since=<ms>]`. The
//! identity claim is validated before the upgrade; a malformed or missing
//! `user` gets a `400 {error}` and no socket.
//!
//! After the upgrade the session:
//! 1. opens the connection through the lifecycle task,
//! 2. sends the replay as `newMessage` frames,
//! 3. forwards live pushes from the relay until either side closes.
//!
//! Inbound text frames are ignored; submissions go through
//! `POST /api/messages`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use relay_core::{outbound_channel, ConnectionHandle, ParticipantId, PushEvent};
use relay_protocol::encode_push;
use relay_protocol::wire_types::Handshake;
use tracing::{debug, info, warn};

use crate::http::ApiError;
use crate::types::{AppState, ConnectionSlot};

pub async fn ws_upgrade(
    State(state): State<AppState>,
    query: Result<Query<Handshake>, QueryRejection>,
    ws: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
) -> Response {
    let Query(handshake) = match query {
        Ok(q) => q,
        Err(e) => return ApiError::bad_request(e.body_text()).into_response(),
    };
    let Some(user) = handshake.user else {
        return ApiError::bad_request("missing user").into_response();
    };
    if let Err(e) = ParticipantId::parse(&user) {
        return ApiError::bad_request(format!("invalid user: {}", e)).into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let Some(slot) = state.connections.try_acquire() else {
        warn!(%user, "rejecting websocket: max_connections reached");
        return ApiError::unavailable("too many connections").into_response();
    };

    let since = handshake.since.unwrap_or(0);
    ws.on_upgrade(move |socket| run_ws_session(socket, slot, user, since, state))
}

async fn run_ws_session(socket: WebSocket, slot: ConnectionSlot, user: String, since: u64, state: AppState) {
    let id = slot.id();
    let _close = state.lifecycle.close_on_drop(id);
    state.lifecycle.connect(id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = outbound_channel(state.config.outbound_buffer);
    let handle = ConnectionHandle::new(id, &out_tx);

    let opened = match state.lifecycle.open(handle, &user, since).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!(connection = %id, error = %e, "websocket open failed");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let participant = opened.participant.clone();
    let mark = opened.replay.mark();

    let mut replayed = 0usize;
    for msg in opened.replay {
        if let Err(e) = send_event(&mut ws_tx, &PushEvent::NewMessage(msg)).await {
            debug!(connection = %id, error = %e, "websocket replay failed");
            return;
        }
        replayed += 1;
    }
    info!(connection = %id, %participant, replayed, "websocket client ready");

    loop {
        tokio::select! {
            Some(event) = out_rx.recv() => {
                if mark.covers(&event) {
                    continue;
                }
                if let Err(e) = send_event(&mut ws_tx, &event).await {
                    debug!(connection = %id, error = %e, "websocket send failed");
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        debug!(connection = %id, len = text.as_str().len(), "ignoring inbound text frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection = %id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    drop(out_tx);
    debug!(connection = %id, %participant, "websocket session ended");
}

async fn send_event(ws_tx: &mut SplitSink<WebSocket, Message>, event: &PushEvent) -> Result<(), axum::Error> {
    let json = encode_push(event).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}
