//! Minimal terminal chat over a signaling relay.
//!
//! ```text
//! cargo run --example chat -- ws://localhost:8080 ROOM42 Alice
//! ```
//!
//! Type to send, `/quit` to leave.

use anyhow::{Context, Result};
use tincan_client::{ClientConfig, RoomClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "tincan_client=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let relay = args
        .next()
        .context("usage: chat <relay-url> <room> <name>")?;
    let room = args.next().context("missing room")?;
    let name = args.next().context("missing name")?;

    let client = RoomClient::new(ClientConfig::new(relay));
    let mut events = client.subscribe();
    client.initialize(&name, &room).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = events.status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("* {}", *events.status.borrow_and_update());
            }
            message = events.messages.recv() => {
                if let Ok(message) = message {
                    let who = if message.is_own {
                        "me"
                    } else {
                        message.user.as_str()
                    };
                    println!("{who}: {}", message.text);
                }
            }
            update = events.typing.recv() => {
                if let Ok(update) = update {
                    if update.is_typing {
                        println!("* {} is typing", update.user);
                    }
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => {
                        client.leave_room().await;
                        break;
                    }
                    Some(line) if !line.trim().is_empty() => {
                        client.send_message(line.trim()).await;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    client.dispose().await;
    Ok(())
}
