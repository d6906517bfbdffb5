// crates/relay-server/src/client.rs
// Raw TCP line transport: one task per connection.

use anyhow::Result;
use futures::StreamExt;
use relay_core::{outbound_channel, ConnectionHandle, ConnectionId, OutboundRx, ReplayMark};
use relay_protocol::{format_server_line, max_line_len, parse_client_line, push_line, ClientLine, ServerLine};
use tokio::io::AsyncWriteExt;
use tokio::net::{tcp::OwnedWriteHalf, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::types::{AppState, ConnectionSlot};

/// Run the line protocol for a single connection.
///
/// 1. Wait for the `HELLO` handshake and open the connection under the
///    claimed participant.
/// 2. Write the replay directly to the socket.
/// 3. Hand the socket's write half to a writer task fed by the relay
///    (pushes) and by this task (acks / errors).
/// 4. Read `M` lines and submit them until the peer disconnects.
///
/// Lines are capped at [`max_line_len`]; a longer one gets
/// `E, line too long` and the connection is closed.
pub async fn run_client(slot: ConnectionSlot, stream: TcpStream, state: AppState) -> Result<()> {
    let id = slot.id();
    let _close = state.lifecycle.close_on_drop(id);
    state.lifecycle.connect(id);

    let (read_stream, mut write_stream) = stream.into_split();
    let codec = LinesCodec::new_with_max_length(max_line_len(state.config.max_text_len));
    let mut lines = FramedRead::new(read_stream, codec);

    // Handshake
    let (user, since) = loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(connection = %id, "handshake line too long");
                write_line(&mut write_stream, &line_too_long()).await?;
                return Ok(());
            }
            Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
            None => {
                debug!(connection = %id, "disconnected before handshake");
                return Ok(());
            }
        };
        match parse_client_line(&line) {
            Ok(None) => continue,
            Ok(Some(ClientLine::Hello { user, since })) => break (user, since.unwrap_or(0)),
            Ok(Some(ClientLine::Submit { .. })) => {
                write_line(&mut write_stream, &ServerLine::Error("HELLO required first".into())).await?;
                return Ok(());
            }
            Err(e) => {
                write_line(&mut write_stream, &ServerLine::Error(e.to_string())).await?;
                return Ok(());
            }
        }
    };

    let (out_tx, out_rx) = outbound_channel(state.config.outbound_buffer);
    let handle = ConnectionHandle::new(id, &out_tx);
    let opened = match state.lifecycle.open(handle, &user, since).await {
        Ok(opened) => opened,
        Err(e) => {
            write_line(&mut write_stream, &ServerLine::Error(e.to_string())).await?;
            return Ok(());
        }
    };
    let participant = opened.participant.clone();
    let mark = opened.replay.mark();

    let mut replayed = 0usize;
    for msg in opened.replay {
        write_line(&mut write_stream, &push_line(&relay_core::PushEvent::NewMessage(msg))).await?;
        replayed += 1;
    }
    info!(connection = %id, %participant, replayed, "line client ready");

    // Writer task: consume pushes and replies, write lines.
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<ServerLine>();
    let writer = tokio::spawn(run_writer(id, write_stream, out_rx, reply_rx, mark));

    // Reader loop
    loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(connection = %id, %participant, "line too long, closing");
                let _ = reply_tx.send(line_too_long());
                break;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                warn!(connection = %id, error = %e, "read error");
                break;
            }
            None => {
                debug!(connection = %id, "peer closed");
                break;
            }
        };

        let reply = match parse_client_line(&line) {
            Ok(None) => continue,
            Ok(Some(ClientLine::Submit { recipient, text })) => {
                match state
                    .relay
                    .submit_from(Some(id), participant.as_str(), recipient.as_deref(), &text)
                    .await
                {
                    Ok(report) => ServerLine::Accepted {
                        seq: report.message.seq,
                        time: report.message.time,
                        delivered: report.delivered_to.len(),
                        recipient_online: report.recipient_online,
                    },
                    Err(e) => ServerLine::Error(e.to_string()),
                }
            }
            Ok(Some(ClientLine::Hello { .. })) => ServerLine::Error("identity already claimed".into()),
            Err(e) => ServerLine::Error(e.to_string()),
        };

        if reply_tx.send(reply).is_err() {
            debug!(connection = %id, "writer gone");
            break;
        }
    }

    // Dropping the strong sender invalidates the registry's weak handle.
    drop(out_tx);
    drop(reply_tx);
    let _ = writer.await;
    Ok(())
}

async fn run_writer(
    id: ConnectionId,
    mut write_stream: OwnedWriteHalf,
    mut out_rx: OutboundRx,
    mut reply_rx: mpsc::UnboundedReceiver<ServerLine>,
    mark: ReplayMark,
) {
    loop {
        let line = tokio::select! {
            Some(event) = out_rx.recv() => {
                if mark.covers(&event) {
                    continue;
                }
                push_line(&event)
            }
            Some(line) = reply_rx.recv() => line,
            else => break,
        };

        if let Err(e) = write_line(&mut write_stream, &line).await {
            warn!(connection = %id, error = %e, "write error");
            break;
        }
    }
}

fn line_too_long() -> ServerLine {
    ServerLine::Error("line too long".into())
}

async fn write_line(stream: &mut OwnedWriteHalf, line: &ServerLine) -> std::io::Result<()> {
    let data = format!("{}\n", format_server_line(line));
    stream.write_all(data.as_bytes()).await?;
    stream.flush().await
}
