//! Interactive terminal chat client
//!
//! Connects to a chat-relay server, prints incoming messages, and sends
//! stdin lines as chat messages.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use chat_relay::server::ChatMessage;

/// Terminal client for the chat relay
#[derive(Parser, Debug)]
#[command(name = "chat-client")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server URL
    #[arg(long, default_value = "ws://localhost:8080")]
    server: String,
}

/// A parsed REPL command.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Connect(&'a str),
    Exit,
    Unknown,
}

fn parse_command(line: &str) -> Command<'_> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("/connect"), Some(username), None) => Command::Connect(username),
        (Some("/exit"), None, None) => Command::Exit,
        _ => Command::Unknown,
    }
}

/// How a chat session came to an end.
enum SessionEnd {
    /// The user typed `/exit`; the program terminates.
    Quit,
    /// The connection went away; the REPL resumes so the user can
    /// `/connect` again.
    Dropped,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("Welcome to the chat!");
    println!("Use /connect username to connect");
    println!("Use /exit to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Connect(username) => {
                match run_session(&args.server, username, &mut lines).await {
                    Ok(SessionEnd::Quit) => return Ok(()),
                    Ok(SessionEnd::Dropped) => {}
                    Err(e) => println!("{e}"),
                }
            }
            Command::Exit => {
                println!("Goodbye!");
                return Ok(());
            }
            Command::Unknown => {
                if line.starts_with("/connect") {
                    println!("Usage: /connect username");
                } else {
                    println!("Unknown command. Use /connect username or /exit");
                }
            }
        }
    }

    Ok(())
}

/// Dial the server and relay between stdin and the chat until the user
/// exits or the connection drops.
async fn run_session(
    server: &str,
    username: &str,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<SessionEnd> {
    let url = format!("{server}/ws?username={username}");
    let (stream, _) = match connect_async(url.as_str()).await {
        Ok(ok) => ok,
        // A 400 carries the server's rejection text; surface it verbatim.
        Err(tungstenite::Error::Http(response)) => {
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .filter(|body| !body.is_empty())
                .unwrap_or_else(|| "connection rejected".to_string());
            bail!("{body}");
        }
        Err(e) => return Err(e).context("connection error"),
    };

    println!("Connected to server as {username}");
    let (mut sink, mut incoming) = stream.split();

    let receiver = tokio::spawn(async move {
        while let Some(frame) = incoming.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Ok(message) = serde_json::from_str::<ChatMessage>(&text) {
                        println!(
                            "[{}] {}: {}",
                            message.time.with_timezone(&Local).format("%H:%M:%S"),
                            message.user,
                            message.text
                        );
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        println!("Lost connection to server");
    });

    let mut end = SessionEnd::Dropped;
    while let Some(line) = lines.next_line().await? {
        if line == "/exit" {
            let _ = sink.send(Message::Close(None)).await;
            println!("Disconnected from server");
            end = SessionEnd::Quit;
            break;
        }
        let payload = serde_json::to_string(&json!({ "message": line }))?;
        if let Err(e) = sink.send(Message::Text(payload.into())).await {
            println!("Error sending message: {e}");
            break;
        }
    }

    receiver.abort();
    Ok(end)
}
