//! Shared helpers for the integration tests: a server running on its own
//! thread, callback counters, and a raw TCP peer for handshake-level checks.

#![allow(dead_code, unused_imports)]

mod client;
mod metrics;
mod server;

use std::time::{Duration, Instant};

pub use client::{RawPeer, spawn_client};
pub use metrics::Metrics;
pub use server::{TestServer, local_config};

/// Poll `cond` every few milliseconds until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
