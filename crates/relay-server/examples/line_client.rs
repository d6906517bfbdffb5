//! Interactive client for the TCP line transport.
//!
//! ```text
//! RELAY_CLIENT_ADDR=127.0.0.1:8748 cargo run -p relay-server --example line_client -- alice
//! ```

use std::env;
use std::error::Error;

use relay_protocol::{format_client_line, parse_server_line, ClientLine, ServerLine};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Where to connect: env override or default.
    let addr = env::var("RELAY_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:8748".to_string());
    let mut args = env::args().skip(1);
    let user = args.next().ok_or("usage: line_client <participant> [since-ms]")?;
    let since = args.next().map(|s| s.parse::<u64>()).transpose()?;

    println!("Connecting to {} as {}...", addr, user);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    let hello = format_client_line(&ClientLine::Hello { user, since });
    write_half.write_all(format!("{}\n", hello).as_bytes()).await?;

    println!("Connected. Type messages as:");
    println!("  bob, hello there     (direct)");
    println!("  #team, standup now   (group)");
    println!("  *, hi all            (everyone)");
    println!("Type 'quit' or 'exit' to leave.\n");

    // Print everything the server sends.
    let printer = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_server_line(&line) {
                Ok(ServerLine::NewMessage(p)) => println!("[{}] {}: {}", p.time, p.sender, p.text),
                Ok(ServerLine::Accepted {
                    seq,
                    delivered,
                    recipient_online,
                    ..
                }) => println!(
                    "  (sent #{}, delivered to {} connection(s){})",
                    seq,
                    delivered,
                    if recipient_online { "" } else { ", recipient offline" }
                ),
                Ok(ServerLine::Error(reason)) => eprintln!("  error: {}", reason),
                Err(e) => eprintln!("  unparseable line {:?}: {}", line, e),
            }
        }
        println!("Server closed the connection.");
    });

    let mut stdin = BufReader::new(io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }

        let Some((recipient, text)) = trimmed.split_once(',') else {
            eprintln!("expected: recipient, text");
            continue;
        };
        let recipient = recipient.trim();
        let submit = ClientLine::Submit {
            recipient: if recipient == "*" { None } else { Some(recipient.to_string()) },
            text: text.trim().to_string(),
        };
        write_half
            .write_all(format!("{}\n", format_client_line(&submit)).as_bytes())
            .await?;
    }

    drop(write_half);
    printer.abort();
    println!("Exiting client.");
    Ok(())
}
