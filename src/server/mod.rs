//! The server: a listening socket, a fixed pool of worker threads and the
//! endpoint registry.
//!
//! ```no_run
//! use simple_ws::{Server, ServerConfig};
//!
//! # fn main() -> simple_ws::Result<()> {
//! let mut server = Server::new(ServerConfig::new().with_port(8080));
//! server.endpoint("^/echo/?$")?.on_message(|conn, msg| {
//!     conn.send(msg.string());
//! });
//! server.start()?; // blocks until stop() is called from another thread
//! # Ok(())
//! # }
//! ```

mod accept;
mod lifecycle;

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::connection::{Connection, lock};
use crate::endpoint::{Endpoint, Router};
use crate::error::{Error, Result};

use accept::{Registry, ServeContext, accept_loop};
use lifecycle::Lifecycle;

/// A WebSocket server.
///
/// `start` blocks the calling thread while the server runs; `stop` may be
/// called from any other thread, after which `start` may be called again.
/// Share the server across threads with an `Arc`.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    lifecycle: Lifecycle,
    registry: Registry,
    workers: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl Server {
    /// Create a server with `config`. Nothing is bound until `start`.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Arc::new(Router::new()),
            lifecycle: Lifecycle::new(),
            registry: Arc::new(Mutex::new(HashMap::new())),
            workers: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The configuration the server was created with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register an endpoint for `pattern`, a regular expression matched
    /// against the whole request path. Endpoints are tried in registration
    /// order. Changes made while running apply from the next `start`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if the pattern does not compile.
    pub fn endpoint(&mut self, pattern: &str) -> Result<&mut Endpoint> {
        Arc::make_mut(&mut self.router).register(pattern)
    }

    /// Bind, spawn the worker pool and serve until [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRunning` if the server is running
    /// - `Error::Io` if the address cannot be resolved or bound, or the
    ///   worker pool cannot be created
    pub fn start(&self) -> Result<()> {
        self.start_with(|_| {})
    }

    /// Like [`start`](Self::start), calling `on_listening` with the bound
    /// address once the listener is ready.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_with<F>(&self, on_listening: F) -> Result<()>
    where
        F: FnOnce(SocketAddr),
    {
        let stop = self.lifecycle.begin()?;
        let result = self.serve(stop, on_listening);
        self.lifecycle.end();
        result
    }

    fn serve<F>(&self, stop: tokio::sync::watch::Receiver<bool>, on_listening: F) -> Result<()>
    where
        F: FnOnce(SocketAddr),
    {
        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;

        let workers = self.config.thread_pool_size.max(1);
        let started = Arc::clone(&self.workers);
        let stopped = Arc::clone(&self.workers);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("simple-ws-worker")
            .on_thread_start(move || {
                started.fetch_add(1, Ordering::SeqCst);
            })
            .on_thread_stop(move || {
                stopped.fetch_sub(1, Ordering::SeqCst);
            })
            .enable_all()
            .build()?;

        let ctx = Arc::new(ServeContext {
            router: Arc::clone(&self.router),
            config: self.config.connection.clone(),
            registry: Arc::clone(&self.registry),
            next_id: Arc::clone(&self.next_id),
        });
        let shutdown = self.config.connection.timeouts.shutdown;

        let served = runtime.block_on(async move {
            let listener = TcpListener::from_std(listener)?;
            info!(addr = %local_addr, workers, "listening");
            on_listening(local_addr);
            accept_loop(listener, ctx, stop, shutdown).await;
            Ok::<_, Error>(())
        });

        // Joins the worker threads.
        drop(runtime);
        lock(&self.registry).clear();
        info!(addr = %local_addr, "server stopped");
        served
    }

    fn bind(&self) -> Result<StdTcpListener> {
        let addrs: Vec<SocketAddr> = (self.config.bind_host(), self.config.port)
            .to_socket_addrs()?
            .collect();
        let listener = StdTcpListener::bind(addrs.as_slice())?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    /// Ask a running server to stop. Returns immediately; `start` returns
    /// once the listener is closed and connections have drained. Open
    /// connections are closed with 1001.
    ///
    /// A stop is not remembered: on a server that is not running this does
    /// nothing, and a later `start` serves until the next `stop`. When
    /// `start` runs on another thread, wait for
    /// [`start_with`](Self::start_with)'s callback (or for
    /// [`is_running`](Self::is_running)) before stopping.
    pub fn stop(&self) {
        if self.lifecycle.request_stop() {
            info!("stop requested");
        }
    }

    /// Returns `true` between `start` and the end of shutdown.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Handles of the connections currently served.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        lock(&self.registry)
            .values()
            .filter(|conn| conn.state().is_active())
            .cloned()
            .collect()
    }

    /// Number of live worker threads. Equals the configured pool size while
    /// running and drops to zero after `start` returns.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("endpoints", &self.router.len())
            .field("running", &self.is_running())
            .finish()
    }
}
