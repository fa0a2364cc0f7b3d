//! Callback counters shared between endpoint closures and test assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use simple_ws::{Endpoint, OutMessage};

#[derive(Default)]
struct Inner {
    opens: AtomicUsize,
    messages: AtomicUsize,
    closes: AtomicUsize,
    errors: AtomicUsize,
    close_codes: Mutex<Vec<u16>>,
}

#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Inner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `endpoint` echo every message back with the same type, counting
    /// each callback.
    pub fn echo(&self, endpoint: &mut Endpoint) {
        let m = self.clone();
        endpoint.on_open(move |_| {
            m.inner.opens.fetch_add(1, Ordering::SeqCst);
        });
        let m = self.clone();
        endpoint.on_message(move |conn, msg| {
            m.inner.messages.fetch_add(1, Ordering::SeqCst);
            if msg.is_binary() {
                conn.send(OutMessage::binary(msg.as_bytes()));
            } else {
                conn.send(msg.string());
            }
        });
        self.observe_end(endpoint);
    }

    /// Count `on_close` and `on_error` only.
    pub fn observe_end(&self, endpoint: &mut Endpoint) {
        let m = self.clone();
        endpoint.on_close(move |_, code, _| {
            m.inner.closes.fetch_add(1, Ordering::SeqCst);
            m.inner.close_codes.lock().unwrap().push(code);
        });
        let m = self.clone();
        endpoint.on_error(move |_, _| {
            m.inner.errors.fetch_add(1, Ordering::SeqCst);
        });
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> usize {
        self.inner.messages.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.inner.errors.load(Ordering::SeqCst)
    }

    /// Total number of callbacks observed.
    pub fn callbacks(&self) -> usize {
        self.opens() + self.messages() + self.closes() + self.errors()
    }

    pub fn close_codes(&self) -> Vec<u16> {
        self.inner.close_codes.lock().unwrap().clone()
    }
}
