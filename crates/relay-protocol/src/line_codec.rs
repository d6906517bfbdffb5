// crates/relay-protocol/src/line_codec.rs

//! Line-oriented text codec for raw TCP clients (netcat-friendly).
//!
//! Client → server:
//!
//! - Handshake (must be the first line):
//!   `HELLO, participant(string)[, since(ms)]`
//!
//! - Submit:
//!   `M, recipient(participant | #group | *), text`
//!   Everything after the second comma is the text, so it may itself
//!   contain commas.
//!
//! Server → client:
//!
//! - Push (live or replay):
//!   `N, time, sender, text`
//!
//! - Submit accepted:
//!   `A, seq, time, delivered(count), recipientOnline(0/1)`
//!
//! - Rejection:
//!   `E, reason`

use relay_core::{participant::BROADCAST_TOKEN, PushEvent};

use crate::error::ProtocolError;
use crate::wire_types::NewMessagePayload;

/// Room on a submit line for everything but the text: command, recipient
/// (at most `#` plus a maximal id), separators and stray whitespace.
pub const LINE_OVERHEAD: usize = 128;

/// Longest client line worth reading when texts are capped at
/// `max_text_len` bytes.
pub fn max_line_len(max_text_len: usize) -> usize {
    max_text_len.saturating_add(LINE_OVERHEAD)
}

/// A parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    Hello { user: String, since: Option<u64> },
    Submit { recipient: Option<String>, text: String },
}

/// A line written by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    NewMessage(NewMessagePayload),
    Accepted {
        seq: u64,
        time: u64,
        delivered: usize,
        recipient_online: bool,
    },
    Error(String),
}

/// Parse a single client line.
///
/// Returns `Ok(None)` for blank lines or comments (starting with `#`).
pub fn parse_client_line(line: &str) -> Result<Option<ClientLine>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut parts = trimmed.splitn(3, ',');
    let command = parts.next().unwrap_or("").trim();

    match command {
        "HELLO" => {
            let user = parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(ProtocolError::MissingField("participant"))?;
            let since = match parts.next().map(str::trim) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse::<u64>().map_err(|_| ProtocolError::InvalidField("since"))?),
            };
            Ok(Some(ClientLine::Hello {
                user: user.to_string(),
                since,
            }))
        }
        "M" => {
            let recipient = parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(ProtocolError::MissingField("recipient"))?;
            let text = parts.next().map(str::trim).unwrap_or("");
            let recipient = if recipient == BROADCAST_TOKEN {
                None
            } else {
                Some(recipient.to_string())
            };
            Ok(Some(ClientLine::Submit {
                recipient,
                text: text.to_string(),
            }))
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

/// Format a client line (used by line clients and tests).
pub fn format_client_line(line: &ClientLine) -> String {
    match line {
        ClientLine::Hello { user, since: None } => format!("HELLO, {}", user),
        ClientLine::Hello {
            user,
            since: Some(since),
        } => format!("HELLO, {}, {}", user, since),
        ClientLine::Submit { recipient, text } => format!(
            "M, {}, {}",
            recipient.as_deref().unwrap_or(BROADCAST_TOKEN),
            single_line(text)
        ),
    }
}

/// Format a server line, without the trailing newline.
pub fn format_server_line(line: &ServerLine) -> String {
    match line {
        ServerLine::NewMessage(p) => format!("N, {}, {}, {}", p.time, p.sender, single_line(&p.text)),
        ServerLine::Accepted {
            seq,
            time,
            delivered,
            recipient_online,
        } => format!(
            "A, {}, {}, {}, {}",
            seq,
            time,
            delivered,
            if *recipient_online { 1 } else { 0 }
        ),
        ServerLine::Error(reason) => format!("E, {}", single_line(reason)),
    }
}

/// Server line for a push event.
pub fn push_line(event: &PushEvent) -> ServerLine {
    match event {
        PushEvent::NewMessage(msg) => ServerLine::NewMessage(NewMessagePayload::from(msg.as_ref())),
    }
}

/// Parse a server line (client side).
pub fn parse_server_line(line: &str) -> Result<ServerLine, ProtocolError> {
    let trimmed = line.trim();
    let command = trimmed.split(',').next().unwrap_or("").trim();

    match command {
        "N" => {
            let tokens: Vec<&str> = trimmed.splitn(4, ',').map(str::trim).collect();
            if tokens.len() != 4 {
                return Err(ProtocolError::MissingField("text"));
            }
            Ok(ServerLine::NewMessage(NewMessagePayload {
                time: parse_u64(tokens[1], "time")?,
                sender: tokens[2].to_string(),
                text: tokens[3].to_string(),
            }))
        }
        "A" => {
            let tokens = split_and_trim(trimmed);
            if tokens.len() != 5 {
                return Err(ProtocolError::MissingField("recipientOnline"));
            }
            let recipient_online = match tokens[4].as_str() {
                "0" => false,
                "1" => true,
                _ => return Err(ProtocolError::InvalidField("recipientOnline")),
            };
            Ok(ServerLine::Accepted {
                seq: parse_u64(&tokens[1], "seq")?,
                time: parse_u64(&tokens[2], "time")?,
                delivered: parse_u64(&tokens[3], "delivered")? as usize,
                recipient_online,
            })
        }
        "E" => {
            let reason = trimmed.splitn(2, ',').nth(1).map(str::trim).unwrap_or("");
            Ok(ServerLine::Error(reason.to_string()))
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn split_and_trim(s: &str) -> Vec<String> {
    s.split(',').map(|tok| tok.trim().to_string()).collect()
}

fn parse_u64(s: &str, field: &'static str) -> Result<u64, ProtocolError> {
    s.parse::<u64>().map_err(|_| ProtocolError::InvalidField(field))
}

/// Frames are newline-delimited; fold embedded line breaks into spaces.
fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_handshake_with_and_without_since() {
        assert_eq!(
            parse_client_line("HELLO, me").unwrap(),
            Some(ClientLine::Hello {
                user: "me".into(),
                since: None
            })
        );
        assert_eq!(
            parse_client_line("HELLO, me, 1700").unwrap(),
            Some(ClientLine::Hello {
                user: "me".into(),
                since: Some(1700)
            })
        );
        assert!(matches!(
            parse_client_line("HELLO"),
            Err(ProtocolError::MissingField("participant"))
        ));
        assert!(matches!(
            parse_client_line("HELLO, me, soon"),
            Err(ProtocolError::InvalidField("since"))
        ));
    }

    #[test]
    fn submit_text_keeps_commas() {
        assert_eq!(
            parse_client_line("M, friend, hi, how are you?").unwrap(),
            Some(ClientLine::Submit {
                recipient: Some("friend".into()),
                text: "hi, how are you?".into()
            })
        );
        assert_eq!(
            parse_client_line("M, *, all").unwrap(),
            Some(ClientLine::Submit {
                recipient: None,
                text: "all".into()
            })
        );
        // Empty text parses; the relay is the one to reject it.
        assert_eq!(
            parse_client_line("M, friend").unwrap(),
            Some(ClientLine::Submit {
                recipient: Some("friend".into()),
                text: String::new()
            })
        );
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_client_line("   ").unwrap(), None);
        assert_eq!(parse_client_line("# note").unwrap(), None);
        assert!(matches!(parse_client_line("X, 1"), Err(ProtocolError::UnknownCommand(_))));
    }

    #[test]
    fn server_lines_parse_back() {
        let push = ServerLine::NewMessage(NewMessagePayload {
            sender: "me".into(),
            text: "a, b\nc".into(),
            time: 42,
        });
        let line = format_server_line(&push);
        assert_eq!(line, "N, 42, me, a, b c");
        assert_eq!(
            parse_server_line(&line).unwrap(),
            ServerLine::NewMessage(NewMessagePayload {
                sender: "me".into(),
                text: "a, b c".into(),
                time: 42,
            })
        );

        let ack = ServerLine::Accepted {
            seq: 7,
            time: 42,
            delivered: 2,
            recipient_online: true,
        };
        assert_eq!(format_server_line(&ack), "A, 7, 42, 2, 1");
        assert_eq!(parse_server_line("A, 7, 42, 2, 1").unwrap(), ack);

        assert_eq!(
            parse_server_line("E, invalid message: text is empty").unwrap(),
            ServerLine::Error("invalid message: text is empty".into())
        );
    }

    #[test]
    fn max_line_fits_a_full_submit() {
        let line = format_client_line(&ClientLine::Submit {
            recipient: Some(format!("#{}", "g".repeat(relay_core::participant::MAX_ID_LEN))),
            text: "x".repeat(4096),
        });
        assert!(line.len() <= max_line_len(4096));
    }
}
