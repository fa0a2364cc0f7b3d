//! Simple WebSocket client.
//!
//! Run the echo server first: cargo run --example echo_server
//! Then run: cargo run --example client [url]

use simple_ws::Client;
use std::error::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "ws://127.0.0.1:9001/echo";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    println!("Connecting to {url}");

    let mut client = Client::new(&url)?;
    client
        .on_open(|conn| {
            println!("Handshake complete, sending greeting");
            conn.send("Hello, WebSocket!");
        })
        .on_message(|conn, msg| {
            println!("Received: {}", msg.string());
            conn.send_close(1000, "goodbye");
        })
        .on_close(|_, code, reason| println!("Closed: {code} {reason:?}"))
        .on_error(|_, err| eprintln!("Error: {err}"));

    client.start()?;
    Ok(())
}
