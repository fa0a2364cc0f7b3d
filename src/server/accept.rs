//! Accept loop and per-channel serving: handshake, routing, session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::codec::http::read_head;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, Role, lock, session};
use crate::endpoint::{Handlers, Router};
use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::handshake::{HandshakeRequest, HandshakeResponse, write_rejection};

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);
/// Bound on terminated sessions finishing their callbacks before abort.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Open connections of a running server, keyed by id.
pub(crate) type Registry = Arc<Mutex<HashMap<u64, Arc<Connection>>>>;

/// Everything a connection task needs from its server.
pub(crate) struct ServeContext {
    pub(crate) router: Arc<Router>,
    pub(crate) config: ConnectionConfig,
    pub(crate) registry: Registry,
    pub(crate) next_id: Arc<AtomicU64>,
}

/// Accept channels until `stop` flips, then close every connection with
/// 1001 and wait up to `shutdown` for them to finish. Connections whose
/// peer never answers are then terminated locally with 1006.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ServeContext>,
    mut stop: watch::Receiver<bool>,
    shutdown: Duration,
) {
    let mut sessions = JoinSet::new();
    let mut delay = ACCEPT_BACKOFF_MIN;

    loop {
        tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    delay = ACCEPT_BACKOFF_MIN;
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                    }
                    sessions.spawn(serve_channel(stream, peer, Arc::clone(&ctx), stop.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(ACCEPT_BACKOFF_MAX);
                }
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "connection task failed");
                }
            }
        }
    }

    drop(listener);
    let open: Vec<_> = lock(&ctx.registry).values().cloned().collect();
    info!(connections = open.len(), "listener closed, closing connections");
    for conn in &open {
        conn.request_close(CloseCode::GoingAway.as_u16(), "server shutting down");
    }
    drop(open);

    let drained = timeout(shutdown, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_ok() {
        return;
    }

    // Close the stragglers locally so their callbacks still run.
    let stragglers: Vec<_> = lock(&ctx.registry).values().cloned().collect();
    warn!(remaining = sessions.len(), "shutdown timed out, closing connections");
    for conn in &stragglers {
        conn.terminate();
    }
    drop(stragglers);

    let finished = timeout(TERMINATE_GRACE, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!(remaining = sessions.len(), "connections stuck in callbacks, aborting");
        sessions.shutdown().await;
    }
}

struct Upgrade {
    request: HandshakeRequest,
    handlers: Handlers,
    captures: Vec<Option<String>>,
    rest: BytesMut,
}

/// Removes a connection from the registry when its task ends, even if a
/// callback panicked or the task was aborted.
struct Registration<'a> {
    registry: &'a Registry,
    id: u64,
}

impl<'a> Registration<'a> {
    fn new(registry: &'a Registry, conn: &Arc<Connection>) -> Self {
        lock(registry).insert(conn.id(), Arc::clone(conn));
        Self {
            registry,
            id: conn.id(),
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(self.registry).remove(&self.id);
    }
}

/// Serve one accepted channel from the upgrade request to the end of its
/// session.
pub(crate) async fn serve_channel<S>(
    mut stream: S,
    peer: SocketAddr,
    ctx: Arc<ServeContext>,
    stop: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let upgrade = match timeout(ctx.config.timeouts.handshake, read_upgrade(&mut stream, &ctx)).await {
        Ok(Ok(upgrade)) => upgrade,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "handshake rejected");
            if let Some(status) = rejection_status(&e) {
                let _ = respond(&mut stream, |buf| write_rejection(status, buf)).await;
            }
            return;
        }
        Err(_) => {
            debug!(%peer, error = %Error::HandshakeTimeout, "handshake rejected");
            return;
        }
    };

    let id = ctx.next_id.fetch_add(1, Ordering::Relaxed);
    let conn = Arc::new(Connection::new(
        id,
        Role::Server,
        upgrade.request.path.clone(),
        upgrade.captures,
        ctx.config.fragment_size,
    ));
    conn.set_remote(peer);
    let _registration = Registration::new(&ctx.registry, &conn);

    if *stop.borrow() {
        debug!(conn_id = id, %peer, "server stopping, refusing upgrade");
        let _ = respond(&mut stream, |buf| write_rejection(503, buf)).await;
        return;
    }

    let response = HandshakeResponse::from_request(&upgrade.request);
    if let Err(e) = respond(&mut stream, |buf| response.write(buf)).await {
        debug!(conn_id = id, %peer, error = %e, "failed to send upgrade response");
        return;
    }
    debug!(conn_id = id, %peer, path = conn.path(), "handshake complete");

    session::run(conn, stream, upgrade.rest, upgrade.handlers, &ctx.config).await;
}

async fn read_upgrade<S>(stream: &mut S, ctx: &ServeContext) -> Result<Upgrade>
where
    S: AsyncRead + Unpin,
{
    let limits = &ctx.config.limits;
    let (head, rest) = read_head(stream, limits).await?;
    let request = HandshakeRequest::parse_with_limit(&head, limits)?;
    request.validate()?;

    let (endpoint, captures) = ctx
        .router
        .route(request.route_path())
        .ok_or_else(|| Error::RouteNotFound(request.route_path().to_string()))?;
    let handlers = endpoint.handlers().clone();

    Ok(Upgrade {
        request,
        handlers,
        captures,
        rest,
    })
}

fn rejection_status(err: &Error) -> Option<u16> {
    match err {
        Error::RouteNotFound(_) => Some(404),
        Error::HandshakeTooLarge { .. } => Some(431),
        Error::InvalidHandshake(_) => Some(400),
        _ => None,
    }
}

async fn respond<S, F>(stream: &mut S, write: F) -> Result<()>
where
    S: AsyncWrite + Unpin,
    F: FnOnce(&mut Vec<u8>),
{
    let mut buf = Vec::with_capacity(256);
    write(&mut buf);
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}
