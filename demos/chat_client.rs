use std::io::{stdin, stdout, Write};

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncBufReadExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() {
    let addr = prompt("💬 Server (host:port): ");
    let event_id = prompt("📅 Event id (UUID): ");
    let token = prompt("🔑 Token: ");

    let url = format!("ws://{}/events/{}/ws?token={}", addr, event_id, token);
    let (socket, _) = match connect_async(&url).await {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("❌ Connection failed: {e}");
            return;
        }
    };
    println!("✅ Connected. Type a message and press enter.");

    let (mut sink, mut stream) = socket.split();

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    // Bursty fan-out arrives newline-coalesced.
                    for line in text.lines() {
                        println!("📨 {}", line);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => {
                    println!("👋 Connection closed");
                    std::process::exit(0);
                }
                _ => {}
            }
        }
    });

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::json!({ "content": line }).to_string();
        if sink.send(Message::Text(frame)).await.is_err() {
            eprintln!("❌ Send failed");
            break;
        }
    }
}

fn prompt(label: &str) -> String {
    print!("{label}");
    stdout().flush().unwrap();
    let mut input = String::new();
    stdin().read_line(&mut input).unwrap();
    input.trim().to_string()
}
