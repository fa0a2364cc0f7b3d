//! Client-side helpers: running a `Client` on its own thread, and a raw TCP
//! peer that speaks the handshake by hand.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use simple_ws::Client;
use simple_ws::protocol::{Frame, HandshakeRequest};

/// Run `client.start()` on a new thread.
pub fn spawn_client(client: Client) -> (Arc<Client>, JoinHandle<simple_ws::Result<()>>) {
    let client = Arc::new(client);
    let runner = Arc::clone(&client);
    (client, std::thread::spawn(move || runner.start()))
}

/// A blocking TCP peer for tests that need control over the raw bytes.
pub struct RawPeer {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl RawPeer {
    /// Connect and send an upgrade request for `path`. Returns the peer and
    /// the response head.
    pub fn upgrade(addr: SocketAddr, path: &str) -> (Self, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut request = Vec::new();
        HandshakeRequest::new(addr.to_string(), path, "dGhlIHNhbXBsZSBub25jZQ==").write(&mut request);
        stream.write_all(&request).unwrap();

        let mut peer = Self {
            stream,
            buf: Vec::new(),
        };
        let head = peer.read_head();
        (peer, head)
    }

    fn read_head(&mut self) -> String {
        loop {
            if let Some(end) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head: Vec<u8> = self.buf.drain(..end + 4).collect();
                return String::from_utf8_lossy(&head).into_owned();
            }
            if self.fill() == 0 {
                return String::from_utf8_lossy(&std::mem::take(&mut self.buf)).into_owned();
            }
        }
    }

    fn fill(&mut self) -> usize {
        let mut chunk = [0u8; 1024];
        let n = self.stream.read(&mut chunk).unwrap_or(0);
        self.buf.extend_from_slice(&chunk[..n]);
        n
    }

    /// Send a frame, masked as a client must.
    pub fn send(&mut self, frame: Frame) {
        self.stream
            .write_all(&frame.encode(Some([0x0a, 0x0b, 0x0c, 0x0d])))
            .unwrap();
    }

    /// Next frame from the server, or `None` once the channel closed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if let Ok((frame, used)) = Frame::parse(&self.buf) {
                self.buf.drain(..used);
                return Some(frame);
            }
            if self.fill() == 0 {
                return None;
            }
        }
    }
}
