//! Signal handling: SIGTERM/SIGINT request graceful shutdown.
//!
//! Uses the `signal-hook` crate for safe signal registration. The read loop
//! polls `SignalHandler` flags each iteration rather than blocking on
//! signals, so a shutdown request is honored within one read timeout.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Thread-safe shutdown state shared between signal handlers and the loop.
///
/// The flag uses `Ordering::Relaxed` because the loop polls it every
/// iteration and exact ordering with other atomics is not required.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not
    /// fatal, since the process can still be stopped by other means.
    pub fn new() -> Self {
        let handler = Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        };
        handler.register_signals();
        handler
    }

    /// A handler with no OS hooks, for tests driving shutdown directly.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown (e.g., after a fatal store error).
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[SCR-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[SCR-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handler_starts_clear() {
        let handler = SignalHandler::detached();
        assert!(!handler.should_shutdown());
    }

    #[test]
    fn request_shutdown_sets_flag_for_all_clones() {
        let handler = SignalHandler::detached();
        let clone = handler.clone();
        handler.request_shutdown();
        assert!(clone.should_shutdown());
    }
}
