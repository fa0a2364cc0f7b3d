//! A `Server` started on a background thread, bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use simple_ws::{Server, ServerConfig};

pub fn local_config(pool: usize) -> ServerConfig {
    ServerConfig::new()
        .with_address("127.0.0.1")
        .with_port(0)
        .with_thread_pool_size(pool)
}

pub struct TestServer {
    server: Arc<Server>,
    addr: SocketAddr,
    thread: Option<JoinHandle<simple_ws::Result<()>>>,
}

impl TestServer {
    /// Start `server` and wait until it listens.
    pub fn spawn(server: Server) -> Self {
        Self::spawn_shared(Arc::new(server))
    }

    /// Start an already shared server, e.g. again after a stop.
    pub fn spawn_shared(server: Arc<Server>) -> Self {
        let (tx, rx) = mpsc::channel();
        let thread = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || {
                server.start_with(move |addr| {
                    let _ = tx.send(addr);
                })
            })
        };
        let addr = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("server did not start listening");
        Self {
            server,
            addr,
            thread: Some(thread),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Client target for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("127.0.0.1:{}{path}", self.addr.port())
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Stop the server and wait for `start` to return.
    pub fn shutdown(mut self) -> simple_ws::Result<()> {
        self.server.stop();
        match self.thread.take() {
            Some(thread) => thread.join().expect("server thread panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.server.stop();
            let _ = thread.join();
        }
    }
}
