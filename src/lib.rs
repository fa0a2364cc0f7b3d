//! # simple-ws - WebSocket server and client engine
//!
//! `simple-ws` implements the RFC 6455 protocol for both roles on top of
//! tokio. A [`Server`] owns a fixed pool of worker threads and routes each
//! upgrade request to the first [`Endpoint`] whose regular expression matches
//! the request path. A [`Client`] runs one outbound connection on the thread
//! that starts it.
//!
//! ## Features
//!
//! - **Callback API**: `on_open`, `on_message`, `on_close`, `on_error`, plus
//!   `on_ping`/`on_pong` observers
//! - **Ordered, non-blocking sends** through a per-connection FIFO, with an
//!   optional completion callback
//! - **Fragmentation** both ways: reassembly of incoming fragments, automatic
//!   splitting of large outgoing messages, and hand-built fragments through
//!   an explicit frame-header byte
//! - **Exactly one terminal callback** per connection
//! - **Restartable server** with bounded graceful shutdown
//!
//! ## Quick Start
//!
//! ```no_run
//! use simple_ws::{Server, ServerConfig};
//!
//! # fn main() -> simple_ws::Result<()> {
//! let mut server = Server::new(ServerConfig::new().with_port(8080));
//! server
//!     .endpoint("^/echo/?$")?
//!     .on_open(|conn| println!("open {:?}", conn.remote_addr()))
//!     .on_message(|conn, msg| conn.send(msg.string()));
//! server.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! Hand-built fragments use the frame-header byte (`FIN << 7 | opcode`):
//!
//! ```no_run
//! # use simple_ws::{Connection, OutMessage};
//! # fn fragments(conn: &Connection) {
//! conn.send(OutMessage::text("a").with_header(0x01));
//! conn.send(OutMessage::text("b").with_header(0x00));
//! conn.send(OutMessage::text("c").with_header(0x80));
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, ConnectionConfig, Limits, ServerConfig, Timeouts};
pub use connection::{Connection, ConnectionState, Role, SendCallback};
pub use endpoint::{Endpoint, Handlers, Router};
pub use error::{Error, ErrorKind, Result};
pub use message::{CloseCode, CloseFrame, InMessage, OutMessage};
pub use protocol::{OpCode, compute_accept_key};
pub use server::Server;
