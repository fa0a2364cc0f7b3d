use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, OnceLock};

use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::connection::fragmenter::split;
use crate::connection::{ConnectionState, Role, lock};
use crate::error::{Error, Result};
use crate::message::OutMessage;
use crate::protocol::{Frame, OpCode};

/// Completion callback of a send: `Ok(())` once the frames were written.
pub type SendCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// One queued send: the frames of a message and its completion callback.
///
/// Dropping an uncompleted send reports `Error::ConnectionClosed` to the
/// callback, so queued messages are never dropped silently.
pub(crate) struct PendingSend {
    pub(crate) frames: Vec<Frame>,
    pub(crate) closes: bool,
    callback: Option<SendCallback>,
}

impl PendingSend {
    fn new(frames: Vec<Frame>, callback: Option<SendCallback>) -> Self {
        let closes = frames.iter().any(|f| f.opcode == OpCode::Close);
        Self {
            frames,
            closes,
            callback,
        }
    }

    pub(crate) fn complete(mut self, result: Result<()>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for PendingSend {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(Error::ConnectionClosed(None)));
        }
    }
}

struct Shared {
    state: ConnectionState,
    queue: Option<UnboundedSender<PendingSend>>,
    write_error: Option<Error>,
    deferred_close: Option<(u16, String)>,
    terminated: bool,
}

/// Handle to one WebSocket connection.
///
/// Handed to every event callback as `&Arc<Connection>`; clone the `Arc` to
/// keep sending from other threads. All sends go through a private FIFO
/// drained by a single writer, so frames reach the channel in call order.
pub struct Connection {
    id: u64,
    role: Role,
    path: String,
    path_match: Vec<Option<String>>,
    remote: OnceLock<SocketAddr>,
    fragment_size: usize,
    shared: Mutex<Shared>,
    wake: Notify,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        role: Role,
        path: String,
        path_match: Vec<Option<String>>,
        fragment_size: usize,
    ) -> Self {
        Self {
            id,
            role,
            path,
            path_match,
            remote: OnceLock::new(),
            fragment_size,
            shared: Mutex::new(Shared {
                state: ConnectionState::Connecting,
                queue: None,
                write_error: None,
                deferred_close: None,
                terminated: false,
            }),
            wake: Notify::new(),
        }
    }

    /// Identifier, unique within a server or client.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Local role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Request target of the handshake, including any query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Capture groups of the endpoint pattern matched against the path.
    /// Index 0 is the whole match. Empty on client connections.
    #[must_use]
    pub fn path_match(&self) -> &[Option<String>] {
        &self.path_match
    }

    /// Peer socket address, once known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote.get().copied()
    }

    /// Peer IP address, once known.
    #[must_use]
    pub fn remote_address(&self) -> Option<IpAddr> {
        self.remote_addr().map(|addr| addr.ip())
    }

    /// Peer port, once known.
    #[must_use]
    pub fn remote_port(&self) -> Option<u16> {
        self.remote_addr().map(|addr| addr.port())
    }

    /// Queue a message. Never blocks.
    ///
    /// Failures are logged; use [`send_with`](Self::send_with) to observe them.
    pub fn send(&self, message: impl Into<OutMessage>) {
        self.submit(message.into(), None);
    }

    /// Queue a message and get told when it was written or failed.
    ///
    /// The callback runs on the connection's writer task.
    pub fn send_with<F>(&self, message: impl Into<OutMessage>, callback: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.submit(message.into(), Some(Box::new(callback)));
    }

    /// Start the closing handshake with `code` and `reason`.
    ///
    /// Moves the connection to `Closing`. Does nothing unless it is `Open`.
    pub fn send_close(&self, code: u16, reason: &str) {
        self.push(Frame::close(Some(code), reason), None);
    }

    /// Close now if open, or as soon as the handshake completes if still
    /// connecting.
    pub(crate) fn request_close(&self, code: u16, reason: &str) {
        {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::Connecting {
                shared.deferred_close = Some((code, reason.to_string()));
                return;
            }
        }
        self.send_close(code, reason);
    }

    fn submit(&self, message: OutMessage, callback: Option<SendCallback>) {
        match message.into_frame() {
            Ok(frame) => self.push(frame, callback),
            Err(e) => {
                warn!(conn_id = self.id, error = %e, "rejected outgoing message");
                if let Some(callback) = callback {
                    callback(Err(e));
                }
            }
        }
    }

    fn push(&self, frame: Frame, callback: Option<SendCallback>) {
        let pending = PendingSend::new(split(frame, self.fragment_size), callback);
        let closes = pending.closes;

        let rejected = {
            let mut shared = lock(&self.shared);
            if !shared.state.can_send() {
                Some(pending)
            } else {
                if closes {
                    shared.state = ConnectionState::Closing;
                }
                match shared.queue.as_ref() {
                    Some(queue) => queue.send(pending).err().map(|e| e.0),
                    None => Some(pending),
                }
            }
        };

        match rejected {
            Some(pending) => {
                debug!(conn_id = self.id, "send on connection that is not open");
                pending.complete(Err(Error::ConnectionClosed(None)));
            }
            None if closes => self.wake.notify_one(),
            None => {}
        }
    }

    /// Queue a control frame the engine sends on its own (pong, close reply).
    /// Only while open; a close frame moves the state to `Closing`.
    pub(crate) fn push_control(&self, frame: Frame) {
        let mut shared = lock(&self.shared);
        if shared.state != ConnectionState::Open {
            return;
        }
        if frame.opcode == OpCode::Close {
            shared.state = ConnectionState::Closing;
        }
        if let Some(queue) = shared.queue.as_ref() {
            let _ = queue.send(PendingSend::new(vec![frame], None));
        }
    }

    /// Enter `Errored`, sending `close` first if the connection is still open.
    pub(crate) fn abort_with(&self, close: Frame) {
        let mut shared = lock(&self.shared);
        if shared.state == ConnectionState::Open {
            if let Some(queue) = shared.queue.as_ref() {
                let _ = queue.send(PendingSend::new(vec![close], None));
            }
        }
        if shared.state != ConnectionState::Closed {
            shared.state = ConnectionState::Errored;
        }
    }

    pub(crate) fn set_remote(&self, addr: SocketAddr) {
        let _ = self.remote.set(addr);
    }

    pub(crate) fn open(&self, queue: UnboundedSender<PendingSend>) {
        let mut shared = lock(&self.shared);
        shared.queue = Some(queue);
        shared.state = ConnectionState::Open;
    }

    pub(crate) fn take_deferred_close(&self) -> Option<(u16, String)> {
        lock(&self.shared).deferred_close.take()
    }

    /// Drop the queue sender so the writer drains what is left and exits.
    pub(crate) fn close_queue(&self) {
        lock(&self.shared).queue = None;
    }

    pub(crate) fn mark_closed(&self) {
        let mut shared = lock(&self.shared);
        shared.state = ConnectionState::Closed;
        shared.queue = None;
    }

    pub(crate) fn write_failed(&self, err: Error) {
        {
            let mut shared = lock(&self.shared);
            shared.write_error.get_or_insert(err);
        }
        self.wake.notify_one();
    }

    pub(crate) fn take_write_error(&self) -> Option<Error> {
        lock(&self.shared).write_error.take()
    }

    /// Stop the session without waiting for the peer. The read loop ends
    /// with 1006 and the terminal callbacks still run.
    pub(crate) fn terminate(&self) {
        lock(&self.shared).terminated = true;
        self.wake.notify_one();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        lock(&self.shared).terminated
    }

    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("path", &self.path)
            .field("remote", &self.remote_addr())
            .field("state", &self.state())
            .finish()
    }
}
