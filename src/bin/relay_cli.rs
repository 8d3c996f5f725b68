use std::error::Error;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{self, AsyncBufReadExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Interactive client: prints relayed messages, sends each stdin line
#[derive(Parser, Debug)]
#[command(name = "relay_cli")]
struct Args {
    /// Relay endpoint
    #[arg(default_value = "ws://127.0.0.1:3479/signal")]
    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (ws_stream, _response) = connect_async(args.url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    println!("Connected to {}", args.url);
    println!("Type a message and press Enter:");

    // Task 1: print whatever other peers send
    let listen_task = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => println!("\n> Peer: {}", text),
                Ok(Message::Binary(bytes)) => println!("\n> Peer: <{} bytes>", bytes.len()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    // Task 2: read stdin and send to the relay
    let mut stdin = io::BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = stdin.next_line().await {
        ws_tx.send(Message::text(line)).await?;
    }

    ws_tx.send(Message::Close(None)).await?;
    listen_task.abort();
    Ok(())
}
