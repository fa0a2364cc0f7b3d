//! Start/stop coordination of a server instance.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::connection::lock;
use crate::error::{Error, Result};

enum Phase {
    Idle,
    Running(watch::Sender<bool>),
}

/// Tracks whether a server is running and carries its stop signal.
///
/// A server moves `Idle -> Running -> Idle` and may repeat the cycle.
pub(crate) struct Lifecycle {
    phase: Mutex<Phase>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Enter `Running` and hand out the receiver the accept loop watches.
    pub(crate) fn begin(&self) -> Result<watch::Receiver<bool>> {
        let mut phase = lock(&self.phase);
        if matches!(*phase, Phase::Running(_)) {
            return Err(Error::AlreadyRunning);
        }
        let (tx, rx) = watch::channel(false);
        *phase = Phase::Running(tx);
        Ok(rx)
    }

    /// Signal the running accept loop to stop. Returns `false` if idle, in
    /// which case nothing is latched for the next `begin`.
    pub(crate) fn request_stop(&self) -> bool {
        match &*lock(&self.phase) {
            Phase::Running(tx) => {
                tx.send_replace(true);
                true
            }
            Phase::Idle => false,
        }
    }

    pub(crate) fn end(&self) {
        *lock(&self.phase) = Phase::Idle;
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*lock(&self.phase), Phase::Running(_))
    }
}
