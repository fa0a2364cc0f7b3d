//! Outbound handshake and session of a client connection.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::target::Target;
use crate::codec::http::read_head;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, session};
use crate::endpoint::Handlers;
use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::handshake::{HandshakeRequest, HandshakeResponse, generate_key};

/// Connect, upgrade and run the session to its end.
///
/// A failed handshake fires `on_error` and `on_close` and is returned; the
/// outcome of an established session is reported through the callbacks only.
pub(crate) async fn run(
    conn: Arc<Connection>,
    target: &Target,
    handlers: &Handlers,
    config: &ConnectionConfig,
) -> Result<()> {
    let upgraded = timeout(config.timeouts.handshake, upgrade(target, config))
        .await
        .unwrap_or(Err(Error::HandshakeTimeout));

    let (stream, rest) = match upgraded {
        Ok(upgraded) => upgraded,
        Err(e) => {
            fail(&conn, handlers, &e);
            return Err(e);
        }
    };
    if let Ok(addr) = stream.peer_addr() {
        conn.set_remote(addr);
    }
    debug!(conn_id = conn.id(), %target, "handshake complete");

    session::run(conn, stream, rest, handlers.clone(), config).await;
    Ok(())
}

async fn upgrade(target: &Target, config: &ConnectionConfig) -> Result<(TcpStream, BytesMut)> {
    let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%target, error = %e, "failed to set TCP_NODELAY");
    }

    let key = generate_key()?;
    let mut request = Vec::with_capacity(256);
    HandshakeRequest::new(target.host_header(), target.path.as_str(), key.as_str()).write(&mut request);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let (head, rest) = read_head(&mut stream, &config.limits).await?;
    HandshakeResponse::parse(&head)?.verify(&key)?;
    Ok((stream, rest))
}

/// Terminal callbacks of a connection that never opened.
pub(crate) fn fail(conn: &Arc<Connection>, handlers: &Handlers, err: &Error) {
    warn!(conn_id = conn.id(), error = %err, "connect failed");
    conn.mark_closed();
    handlers.error(conn, err);
    handlers.close(conn, CloseCode::Abnormal.as_u16(), &err.to_string());
}
