//! Endpoints: path patterns with event callbacks, and the registry that
//! routes a handshake path to the first matching endpoint.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::InMessage;

type OpenFn = dyn Fn(&Arc<Connection>) + Send + Sync;
type MessageFn = dyn Fn(&Arc<Connection>, &InMessage) + Send + Sync;
type CloseFn = dyn Fn(&Arc<Connection>, u16, &str) + Send + Sync;
type ErrorFn = dyn Fn(&Arc<Connection>, &Error) + Send + Sync;
type ControlFn = dyn Fn(&Arc<Connection>, &[u8]) + Send + Sync;

/// Event callbacks of an endpoint or client. Unset slots are no-ops.
#[derive(Clone, Default)]
pub struct Handlers {
    open: Option<Arc<OpenFn>>,
    message: Option<Arc<MessageFn>>,
    close: Option<Arc<CloseFn>>,
    error: Option<Arc<ErrorFn>>,
    ping: Option<Arc<ControlFn>>,
    pong: Option<Arc<ControlFn>>,
}

impl Handlers {
    /// Called once the handshake completed, before any other callback.
    pub fn set_open<F>(&mut self, f: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.open = Some(Arc::new(f));
    }

    /// Called for every complete message, in arrival order.
    pub fn set_message<F>(&mut self, f: F)
    where
        F: Fn(&Arc<Connection>, &InMessage) + Send + Sync + 'static,
    {
        self.message = Some(Arc::new(f));
    }

    /// Called exactly once when the connection ends, with the close status
    /// and reason.
    pub fn set_close<F>(&mut self, f: F)
    where
        F: Fn(&Arc<Connection>, u16, &str) + Send + Sync + 'static,
    {
        self.close = Some(Arc::new(f));
    }

    /// Called before `close` when the connection ends with an error.
    pub fn set_error<F>(&mut self, f: F)
    where
        F: Fn(&Arc<Connection>, &Error) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(f));
    }

    /// Called for every ping, after the pong has been queued.
    pub fn set_ping<F>(&mut self, f: F)
    where
        F: Fn(&Arc<Connection>, &[u8]) + Send + Sync + 'static,
    {
        self.ping = Some(Arc::new(f));
    }

    /// Called for every pong.
    pub fn set_pong<F>(&mut self, f: F)
    where
        F: Fn(&Arc<Connection>, &[u8]) + Send + Sync + 'static,
    {
        self.pong = Some(Arc::new(f));
    }

    pub(crate) fn open(&self, conn: &Arc<Connection>) {
        if let Some(f) = &self.open {
            f(conn);
        }
    }

    pub(crate) fn message(&self, conn: &Arc<Connection>, message: &InMessage) {
        if let Some(f) = &self.message {
            f(conn, message);
        }
    }

    pub(crate) fn close(&self, conn: &Arc<Connection>, code: u16, reason: &str) {
        if let Some(f) = &self.close {
            f(conn, code, reason);
        }
    }

    pub(crate) fn error(&self, conn: &Arc<Connection>, err: &Error) {
        if let Some(f) = &self.error {
            f(conn, err);
        }
    }

    pub(crate) fn ping(&self, conn: &Arc<Connection>, payload: &[u8]) {
        if let Some(f) = &self.ping {
            f(conn, payload);
        }
    }

    pub(crate) fn pong(&self, conn: &Arc<Connection>, payload: &[u8]) {
        if let Some(f) = &self.pong {
            f(conn, payload);
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("open", &self.open.is_some())
            .field("message", &self.message.is_some())
            .field("close", &self.close.is_some())
            .field("error", &self.error.is_some())
            .field("ping", &self.ping.is_some())
            .field("pong", &self.pong.is_some())
            .finish()
    }
}

/// A registered path pattern and its callbacks.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pattern: String,
    regex: Regex,
    handlers: Handlers,
}

impl Endpoint {
    fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{pattern})$"))?,
            handlers: Handlers::default(),
        })
    }

    /// The pattern as registered.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The endpoint's callbacks.
    #[must_use]
    pub fn handlers(&self) -> &Handlers {
        &self.handlers
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

    fn captures(&self, path: &str) -> Option<Vec<Option<String>>> {
        self.regex.captures(path).map(|caps| {
            caps.iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect()
        })
    }
}

/// Endpoints in registration order.
#[derive(Clone, Debug, Default)]
pub struct Router {
    endpoints: Vec<Endpoint>,
}

impl Router {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern` as a regular expression anchored at both ends and
    /// register it. Registering the same pattern again returns the existing
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if the pattern does not compile.
    pub fn register(&mut self, pattern: &str) -> Result<&mut Endpoint> {
        let index = match self.endpoints.iter().position(|e| e.pattern == pattern) {
            Some(index) => index,
            None => {
                self.endpoints.push(Endpoint::new(pattern)?);
                self.endpoints.len() - 1
            }
        };
        Ok(&mut self.endpoints[index])
    }

    /// First endpoint whose pattern matches `path`, with its capture groups.
    #[must_use]
    pub fn route(&self, path: &str) -> Option<(&Endpoint, Vec<Option<String>>)> {
        self.endpoints
            .iter()
            .find_map(|endpoint| endpoint.captures(path).map(|caps| (endpoint, caps)))
    }

    /// Number of registered endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
