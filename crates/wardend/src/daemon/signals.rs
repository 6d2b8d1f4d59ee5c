//! Translates POSIX signals into control-loop actions.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, info, warn};

use super::CONTROL_TARGET;
use crate::actions::{Action, ActionSender};

/// Signals `wardend` listens for.
pub const FORWARDED_SIGNALS: [i32; 5] = [SIGHUP, SIGUSR1, SIGUSR2, SIGTERM, SIGINT];

/// Maps a received signal onto the action it requests.
#[must_use]
pub fn action_for(signal: i32) -> Option<Action> {
    match signal {
        SIGHUP => Some(Action::Reload),
        SIGUSR1 => Some(Action::Restart),
        SIGUSR2 => Some(Action::Start),
        SIGTERM | SIGINT => Some(Action::Shutdown),
        _ => None,
    }
}

/// Background thread forwarding signals to an [`ActionSender`].
#[derive(Debug)]
pub struct SignalForwarder {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    /// Registers the handlers and starts forwarding.
    pub fn install(actions: Arc<dyn ActionSender>) -> io::Result<Self> {
        let mut signals = Signals::new(FORWARDED_SIGNALS)?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("signal-forwarder".into())
            .spawn(move || {
                for signal in signals.forever() {
                    let Some(action) = action_for(signal) else {
                        debug!(target: CONTROL_TARGET, signal, "ignoring signal");
                        continue;
                    };
                    info!(target: CONTROL_TARGET, signal, %action, "signal received");
                    if !actions.send(action) {
                        break;
                    }
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Unregisters the handlers and joins the forwarding thread.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: CONTROL_TARGET, "signal forwarder panicked");
            }
        }
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}
