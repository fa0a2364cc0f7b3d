//! Connections: the shared handle, its lifecycle states, and the per-connection
//! session that runs the read loop, the writer and the event callbacks.
//!
//! ## Lifecycle
//!
//! 1. **Connecting** - handshake in progress
//! 2. **Open** - `on_open` has fired; messages flow
//! 3. **Closing** - a close frame was sent or received
//! 4. **Errored** - a protocol or transport error ended the connection
//! 5. **Closed** - `on_close` fires once, preceded by `on_error` on the error path

#[allow(clippy::module_inception)]
mod connection;
mod fragmenter;
mod role;
pub(crate) mod session;
mod state;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use connection::{Connection, SendCallback};
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::ConnectionState;

/// Lock a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
