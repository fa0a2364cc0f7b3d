//! The client: one outbound connection run on the caller's thread.
//!
//! ```no_run
//! use simple_ws::Client;
//!
//! # fn main() -> simple_ws::Result<()> {
//! let mut client = Client::new("localhost:8080/echo")?;
//! client
//!     .on_open(|conn| conn.send("Hello"))
//!     .on_message(|conn, msg| {
//!         println!("{}", msg.string());
//!         conn.send_close(1000, "");
//!     });
//! client.start()?; // returns once the connection is closed
//! # Ok(())
//! # }
//! ```

mod connect;
mod target;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use crate::config::ClientConfig;
use crate::connection::{Connection, Role, lock};
use crate::endpoint::Handlers;
use crate::error::{Error, Result};
use crate::message::{CloseCode, InMessage};

use target::Target;

#[derive(Default)]
struct Run {
    thread: Option<ThreadId>,
    conn: Option<Arc<Connection>>,
}

/// A WebSocket client.
///
/// Set the callbacks, then call [`start`](Self::start), which connects and
/// blocks until the connection is closed. [`stop`](Self::stop) may be called
/// from another thread or from inside a callback.
pub struct Client {
    target: Target,
    config: ClientConfig,
    handlers: Handlers,
    run: Mutex<Run>,
    done: Condvar,
    next_id: AtomicU64,
}

impl Client {
    /// Create a client for `host:port/path`. A `ws://` prefix is accepted,
    /// the port defaults to 80 and the path to `/`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the target cannot be parsed.
    pub fn new(target: &str) -> Result<Self> {
        Self::with_config(target, ClientConfig::default())
    }

    /// Create a client with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the target cannot be parsed.
    pub fn with_config(target: &str, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            target: Target::parse(target)?,
            config,
            handlers: Handlers::default(),
            run: Mutex::new(Run::default()),
            done: Condvar::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Set the open callback.
    pub fn on_open<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.handlers.set_open(f);
        self
    }

    /// Set the message callback.
    pub fn on_message<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<Connection>, &InMessage) + Send + Sync + 'static,
    {
        self.handlers.set_message(f);
        self
    }

    /// Set the close callback.
    pub fn on_close<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<Connection>, u16, &str) + Send + Sync + 'static,
    {
        self.handlers.set_close(f);
        self
    }

    /// Set the error callback.
    pub fn on_error<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<Connection>, &Error) + Send + Sync + 'static,
    {
        self.handlers.set_error(f);
        self
    }

    /// Set the ping observer.
    pub fn on_ping<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<Connection>, &[u8]) + Send + Sync + 'static,
    {
        self.handlers.set_ping(f);
        self
    }

    /// Set the pong observer.
    pub fn on_pong<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<Connection>, &[u8]) + Send + Sync + 'static,
    {
        self.handlers.set_pong(f);
        self
    }

    /// Connect and run the connection on the calling thread until it closes.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRunning` if the client is running
    /// - the handshake error if the connection could not be established;
    ///   `on_error` and `on_close` have fired by then
    pub fn start(&self) -> Result<()> {
        let conn = {
            let mut run = lock(&self.run);
            if run.thread.is_some() {
                return Err(Error::AlreadyRunning);
            }
            let conn = Arc::new(Connection::new(
                self.next_id.fetch_add(1, Ordering::Relaxed),
                Role::Client,
                self.target.path.clone(),
                Vec::new(),
                self.config.connection.fragment_size,
            ));
            run.thread = Some(thread::current().id());
            run.conn = Some(Arc::clone(&conn));
            conn
        };

        let result = self.drive(conn);

        lock(&self.run).thread = None;
        self.done.notify_all();
        result
    }

    fn drive(&self, conn: Arc<Connection>) -> Result<()> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let err = Error::from(e);
                connect::fail(&conn, &self.handlers, &err);
                return Err(err);
            }
        };
        runtime.block_on(connect::run(
            conn,
            &self.target,
            &self.handlers,
            &self.config.connection,
        ))
    }

    /// Close the connection with 1000 and wait until it is closed.
    ///
    /// A connection still in its handshake is closed right after it opens.
    /// Called from a callback, only the close is requested. Does nothing if
    /// the client is not running.
    pub fn stop(&self) {
        let mut run = lock(&self.run);
        let Some(runner) = run.thread else {
            return;
        };
        if let Some(conn) = &run.conn {
            conn.request_close(CloseCode::Normal.as_u16(), "");
        }
        if runner == thread::current().id() {
            return;
        }
        while run.thread.is_some() {
            run = self.done.wait(run).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `true` while `start` is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.run).thread.is_some()
    }

    /// The current connection, or the last one once `start` returned.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<Connection>> {
        lock(&self.run).conn.clone()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("target", &self.target.to_string())
            .field("running", &self.is_running())
            .finish()
    }
}
