//! Passing termination signals from the launcher on to its child.
//!
//! The child runs in its own session, so a SIGTERM or SIGHUP aimed at the
//! launcher would otherwise leave it running. Handlers are installed before
//! the fork; anything that arrives before the child's pid is known stays
//! pending and is relayed once [`SignalForwarder::forward_to`] is called.

use signal_hook::consts::{SIGHUP, SIGTERM};
use signal_hook::iterator::Handle;
use signal_hook::iterator::Signals;
use std::thread::{self, JoinHandle};
use tracing::info;
use tracing::warn;

use crate::error::LaunchError;

pub const FORWARDED_SIGNALS: [libc::c_int; 2] = [SIGTERM, SIGHUP];

/// Catches SIGTERM and SIGHUP from [`install`](Self::install) on and relays
/// them to the child named by [`forward_to`](Self::forward_to) until dropped.
pub struct SignalForwarder {
    signals: Option<Signals>,
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    pub fn install() -> Result<Self, LaunchError> {
        let signals =
            Signals::new(FORWARDED_SIGNALS).map_err(|e| LaunchError::SignalSetup(e.to_string()))?;
        let handle = signals.handle();
        Ok(Self {
            signals: Some(signals),
            handle,
            thread: None,
        })
    }

    /// Starts relaying to `pid`, including signals caught since `install`.
    pub fn forward_to(&mut self, pid: libc::pid_t) -> Result<(), LaunchError> {
        let Some(mut signals) = self.signals.take() else {
            return Err(LaunchError::SignalSetup(
                "signals are already being forwarded".to_string(),
            ));
        };

        let thread = thread::Builder::new()
            .name("signal-forwarder".to_string())
            .spawn(move || {
                for sig in signals.forever() {
                    info!(signal = sig, pid, "Forwarding signal to child");
                    // SAFETY: kill has no memory safety preconditions
                    if unsafe { libc::kill(pid, sig) } != 0 {
                        warn!(
                            signal = sig,
                            pid,
                            error = %std::io::Error::last_os_error(),
                            "Failed to forward signal"
                        );
                    }
                }
            })
            .map_err(|e| {
                LaunchError::SignalSetup(format!("failed to spawn signal forwarder: {}", e))
            })?;

        self.thread = Some(thread);
        Ok(())
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
