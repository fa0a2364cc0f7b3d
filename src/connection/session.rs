//! The event loop of one open connection.
//!
//! A session owns the read half of the channel and the fragment assembler.
//! Every callback of the connection runs here, one at a time. Writes happen
//! on a separate writer task that drains the connection's FIFO.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, warn};

use crate::codec::{FrameReader, FrameWriter};
use crate::config::{ConnectionConfig, Timeouts};
use crate::connection::connection::PendingSend;
use crate::connection::{Connection, ConnectionState};
use crate::endpoint::Handlers;
use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::{Frame, FrameValidator, MessageAssembler, OpCode};

/// How a connection ended: the status handed to `on_close`, and the error
/// for `on_error` on the error path.
#[derive(Debug)]
pub(crate) struct Ending {
    pub(crate) code: u16,
    pub(crate) reason: String,
    pub(crate) error: Option<Error>,
}

impl Ending {
    fn abnormal(reason: &str) -> Self {
        Self {
            code: CloseCode::Abnormal.as_u16(),
            reason: reason.to_string(),
            error: None,
        }
    }
}

enum Event {
    Woken,
    CloseTimeout,
    Idle,
    Read(Result<Frame>),
}

/// Run an upgraded channel to completion.
///
/// Fires `on_open`, then message and control callbacks, and finally exactly
/// one `on_close`, preceded by `on_error` when the connection failed.
pub(crate) async fn run<S>(
    conn: Arc<Connection>,
    stream: S,
    buffered: BytesMut,
    handlers: Handlers,
    config: &ConnectionConfig,
) -> Ending
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (queue, rx) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_loop(
        FrameWriter::new(write_half, conn.role()),
        rx,
        Arc::clone(&conn),
    ));

    conn.open(queue);
    debug!(conn_id = conn.id(), peer = ?conn.remote_addr(), path = conn.path(), "connection open");
    handlers.open(&conn);
    if let Some((code, reason)) = conn.take_deferred_close() {
        conn.send_close(code, &reason);
    }

    let mut session = Session {
        conn: &conn,
        reader: FrameReader::new(
            read_half,
            FrameValidator::new(conn.role(), config.limits.clone()),
            buffered,
        ),
        assembler: MessageAssembler::new(config.limits.clone()),
        handlers: &handlers,
        timeouts: &config.timeouts,
    };
    let ending = session.read_loop().await;
    drop(session);

    conn.close_queue();
    let grace = if conn.is_terminated() {
        Duration::ZERO
    } else {
        config.timeouts.close
    };
    if timeout(grace, &mut writer).await.is_err() {
        warn!(conn_id = conn.id(), "writer did not finish, aborting");
        writer.abort();
    }
    conn.mark_closed();

    if let Some(err) = &ending.error {
        handlers.error(&conn, err);
    }
    debug!(conn_id = conn.id(), code = ending.code, reason = %ending.reason, "connection closed");
    handlers.close(&conn, ending.code, &ending.reason);
    ending
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut queue: UnboundedReceiver<PendingSend>,
    conn: Arc<Connection>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(pending) = queue.recv().await {
        match writer.write_frames(&pending.frames).await {
            Ok(()) => {
                let closes = pending.closes;
                pending.complete(Ok(()));
                if closes {
                    let _ = writer.shutdown().await;
                    break;
                }
            }
            Err(e) => {
                pending.complete(Err(e.clone()));
                conn.write_failed(e);
                break;
            }
        }
    }
    // Dropping the receiver fails the callbacks of anything still queued.
}

struct Session<'a, R> {
    conn: &'a Arc<Connection>,
    reader: FrameReader<R>,
    assembler: MessageAssembler,
    handlers: &'a Handlers,
    timeouts: &'a Timeouts,
}

impl<R: AsyncRead + Unpin> Session<'_, R> {
    async fn read_loop(&mut self) -> Ending {
        let mut close_deadline: Option<Instant> = None;

        loop {
            let event = tokio::select! {
                () = self.conn.woken() => Event::Woken,
                () = sleep_until_deadline(close_deadline) => Event::CloseTimeout,
                read = read_with_idle(&mut self.reader, self.timeouts.idle) => match read {
                    Some(result) => Event::Read(result),
                    None => Event::Idle,
                },
            };

            match event {
                Event::Woken => {
                    if self.conn.is_terminated() {
                        debug!(conn_id = self.conn.id(), "terminated");
                        return Ending::abnormal("server shutting down");
                    }
                    if let Some(err) = self.conn.take_write_error() {
                        return Ending {
                            code: CloseCode::Abnormal.as_u16(),
                            reason: err.to_string(),
                            error: Some(err),
                        };
                    }
                    if close_deadline.is_none() && self.conn.state() == ConnectionState::Closing {
                        close_deadline = Some(Instant::now() + self.timeouts.close);
                    }
                }
                Event::CloseTimeout => {
                    debug!(conn_id = self.conn.id(), "peer did not answer close");
                    return Ending::abnormal("close handshake timed out");
                }
                Event::Idle => {
                    if self.conn.state() == ConnectionState::Open {
                        self.conn.send_close(CloseCode::Normal.as_u16(), "idle timeout");
                    }
                }
                Event::Read(Ok(frame)) => {
                    if let Some(ending) = self.on_frame(frame) {
                        return ending;
                    }
                }
                Event::Read(Err(Error::ConnectionClosed(_))) => return Ending::abnormal(""),
                Event::Read(Err(e)) => return self.fail(e),
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Option<Ending> {
        match frame.opcode {
            OpCode::Ping => {
                let payload = frame.into_payload();
                self.conn.push_control(Frame::pong(payload.clone()));
                self.handlers.ping(self.conn, &payload);
                None
            }
            OpCode::Pong => {
                self.handlers.pong(self.conn, frame.payload());
                None
            }
            OpCode::Close => Some(match frame.close_frame() {
                Ok(Some(close)) => {
                    let code = close.code.as_u16();
                    self.conn.push_control(Frame::close(Some(code), ""));
                    Ending {
                        code,
                        reason: close.reason,
                        error: None,
                    }
                }
                Ok(None) => {
                    self.conn.push_control(Frame::close(None, ""));
                    Ending {
                        code: CloseCode::Normal.as_u16(),
                        reason: String::new(),
                        error: None,
                    }
                }
                Err(e) => self.fail(e),
            }),
            OpCode::Text | OpCode::Binary | OpCode::Continuation => match self.assembler.push(frame) {
                Ok(Some(message)) => {
                    self.handlers.message(self.conn, &message);
                    None
                }
                Ok(None) => None,
                Err(e) => Some(self.fail(e)),
            },
        }
    }

    fn fail(&self, err: Error) -> Ending {
        let code = if err.is_protocol() {
            err.close_code()
        } else {
            CloseCode::Abnormal.as_u16()
        };
        warn!(conn_id = self.conn.id(), error = %err, code, "connection failed");
        if err.is_protocol() {
            self.conn.abort_with(Frame::close(Some(code), ""));
        } else {
            self.conn.abort_with(Frame::close(None, ""));
        }
        Ending {
            code,
            reason: err.to_string(),
            error: Some(err),
        }
    }
}

async fn read_with_idle<R>(reader: &mut FrameReader<R>, idle: Option<Duration>) -> Option<Result<Frame>>
where
    R: AsyncRead + Unpin,
{
    match idle {
        Some(limit) => timeout(limit, reader.read_frame()).await.ok(),
        None => Some(reader.read_frame().await),
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Role;
    use crate::message::InMessage;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn recording_handlers(log: &Arc<Log>) -> Handlers {
        let mut handlers = Handlers::default();
        let l = Arc::clone(log);
        handlers.set_open(move |_| l.push("open".into()));
        let l = Arc::clone(log);
        handlers.set_message(move |conn: &Arc<Connection>, msg: &InMessage| {
            l.push(format!("message:{}", msg.string()));
            conn.send(msg.string());
        });
        let l = Arc::clone(log);
        handlers.set_error(move |_, err: &Error| l.push(format!("error:{}", err.close_code())));
        let l = Arc::clone(log);
        handlers.set_close(move |_, code, reason: &str| l.push(format!("close:{code}:{reason}")));
        handlers
    }

    fn server_conn() -> Arc<Connection> {
        Arc::new(Connection::new(7, Role::Server, "/echo".into(), Vec::new(), 16 * 1024))
    }

    /// The client side of a duplex pipe, keeping bytes that arrive past a frame.
    struct Peer {
        io: DuplexStream,
        buf: Vec<u8>,
    }

    impl Peer {
        fn new(io: DuplexStream) -> Self {
            Self { io, buf: Vec::new() }
        }

        async fn send(&mut self, frame: Frame) {
            self.io
                .write_all(&frame.encode(Some([0x11, 0x22, 0x33, 0x44])))
                .await
                .unwrap();
        }

        async fn next_frame(&mut self) -> Frame {
            loop {
                if let Ok((frame, used)) = Frame::parse(&self.buf) {
                    self.buf.drain(..used);
                    return frame;
                }
                let mut chunk = [0u8; 256];
                let n = self.io.read(&mut chunk).await.unwrap();
                assert!(n > 0, "channel closed before a frame arrived");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    #[tokio::test]
    async fn test_echo_then_peer_close() {
        let (local, remote) = tokio::io::duplex(4096);
        let mut peer = Peer::new(remote);
        let log = Arc::new(Log::default());
        let conn = server_conn();
        let config = ConnectionConfig::default();

        let session = tokio::spawn({
            let handlers = recording_handlers(&log);
            let conn = Arc::clone(&conn);
            async move { run(conn, local, BytesMut::new(), handlers, &config).await }
        });

        peer.send(Frame::text(&b"Hello"[..])).await;
        let echoed = peer.next_frame().await;
        assert_eq!(echoed.payload(), b"Hello");

        peer.send(Frame::close(Some(1000), "done")).await;
        let reply = peer.next_frame().await;
        assert_eq!(reply.opcode, OpCode::Close);

        let ending = session.await.unwrap();
        assert_eq!(ending.code, 1000);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            log.entries(),
            vec!["open", "message:Hello", "close:1000:done"]
        );
    }

    #[tokio::test]
    async fn test_fragmented_message_with_interleaved_ping() {
        let (local, remote) = tokio::io::duplex(4096);
        let mut peer = Peer::new(remote);
        let log = Arc::new(Log::default());
        let config = ConnectionConfig::default();
        let session = tokio::spawn({
            let handlers = recording_handlers(&log);
            let conn = server_conn();
            async move { run(conn, local, BytesMut::new(), handlers, &config).await }
        });

        peer.send(Frame::from_header_byte(1, &b"a"[..]).unwrap()).await;
        peer.send(Frame::ping(&b"p"[..])).await;
        peer.send(Frame::from_header_byte(0, &b"b"[..]).unwrap()).await;
        peer.send(Frame::from_header_byte(128, &b"c"[..]).unwrap()).await;

        let pong = peer.next_frame().await;
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload(), b"p");
        let echoed = peer.next_frame().await;
        assert_eq!(echoed.payload(), b"abc");

        drop(peer);
        let ending = session.await.unwrap();
        assert_eq!(ending.code, 1006);
        assert_eq!(log.entries(), vec!["open", "message:abc", "close:1006:"]);
    }

    #[tokio::test]
    async fn test_protocol_error_takes_error_path() {
        let (local, remote) = tokio::io::duplex(4096);
        let mut peer = Peer::new(remote);
        let log = Arc::new(Log::default());
        let config = ConnectionConfig::default();
        let session = tokio::spawn({
            let handlers = recording_handlers(&log);
            let conn = server_conn();
            async move { run(conn, local, BytesMut::new(), handlers, &config).await }
        });

        // Continuation without a started message.
        peer.send(Frame::new(true, OpCode::Continuation, &b"x"[..])).await;
        let close = peer.next_frame().await;
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(&close.payload()[..2], &1002u16.to_be_bytes());

        let ending = session.await.unwrap();
        assert!(ending.error.is_some());
        assert_eq!(
            log.entries(),
            vec!["open".to_string(), "error:1002".into(), format!("close:1002:{}", ending.reason)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_close_times_out_as_abnormal() {
        let (local, _peer) = tokio::io::duplex(4096);
        let log = Arc::new(Log::default());
        let conn = server_conn();
        let config = ConnectionConfig::default();
        let session = tokio::spawn({
            let handlers = recording_handlers(&log);
            let conn = Arc::clone(&conn);
            async move { run(conn, local, BytesMut::new(), handlers, &config).await }
        });

        while conn.state() != ConnectionState::Open {
            tokio::task::yield_now().await;
        }
        conn.send_close(1000, "");

        let ending = session.await.unwrap();
        assert_eq!(ending.code, 1006);
        assert_eq!(ending.reason, "close handshake timed out");
    }

    #[tokio::test]
    async fn test_terminate_still_fires_close() {
        let (local, _peer) = tokio::io::duplex(4096);
        let log = Arc::new(Log::default());
        let conn = server_conn();
        let mut config = ConnectionConfig::default();
        config.timeouts = config.timeouts.with_close(Duration::from_secs(3600));
        let session = tokio::spawn({
            let handlers = recording_handlers(&log);
            let conn = Arc::clone(&conn);
            async move { run(conn, local, BytesMut::new(), handlers, &config).await }
        });

        while conn.state() != ConnectionState::Open {
            tokio::task::yield_now().await;
        }
        conn.send_close(1001, "server shutting down");
        conn.terminate();

        let ending = tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .expect("terminated session should end without waiting for the peer")
            .unwrap();
        assert_eq!(ending.code, 1006);
        assert!(ending.error.is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(log.entries(), vec!["open", "close:1006:server shutting down"]);
    }
}
