//! WebSocket echo server with two routed endpoints.
//!
//! Run with: cargo run --example echo_server
//! Then connect with: cargo run --example client
//!
//! Set `RUST_LOG=simple_ws=debug` to see per-connection events.

use simple_ws::{Server, ServerConfig};
use std::error::Error;
use tracing_subscriber::EnvFilter;

const PORT: u16 = 9001;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut server = Server::new(
        ServerConfig::new()
            .with_address("127.0.0.1")
            .with_port(PORT)
            .with_thread_pool_size(4),
    );

    server
        .endpoint("^/echo/?$")?
        .on_open(|conn| println!("[{}] open from {:?}", conn.id(), conn.remote_addr()))
        .on_message(|conn, msg| {
            if msg.is_text() {
                println!("[{}] text: {}", conn.id(), msg.string());
                conn.send(msg.string());
            } else {
                println!("[{}] binary: {} bytes", conn.id(), msg.len());
                conn.send(simple_ws::OutMessage::binary(msg.as_bytes()));
            }
        })
        .on_close(|conn, code, reason| println!("[{}] closed: {code} {reason:?}", conn.id()))
        .on_error(|conn, err| eprintln!("[{}] error: {err}", conn.id()));

    // Greets with the captured room name, then echoes in upper case.
    server
        .endpoint("^/rooms/([a-z0-9_-]+)$")?
        .on_open(|conn| {
            let room = conn.path_match()[1].clone().unwrap_or_default();
            conn.send(format!("welcome to {room}"));
        })
        .on_message(|conn, msg| conn.send(msg.string().to_uppercase()));

    server.start_with(|addr| println!("WebSocket echo server listening on ws://{addr}"))?;
    Ok(())
}
