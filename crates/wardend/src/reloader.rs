//! In-place configuration reload and cheap restart requests.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::actions::{Action, ActionSender};
use crate::process::{ProcessRunner, RunRequest, Signal, send_signal};
use crate::terminator::{KillTarget, RELOAD_CHAIN, base_name, chain_script};

const RELOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reloader");

/// Asks a running daemon to re-read its configuration.
///
/// Never touches the lifecycle phase; callers own any transition around a
/// reload.
pub struct Reloader {
    runner: Arc<dyn ProcessRunner>,
    actions: Arc<dyn ActionSender>,
}

impl Reloader {
    /// Reloader running shell fallbacks through `runner` and routing restart
    /// requests through `actions`.
    pub fn new(runner: Arc<dyn ProcessRunner>, actions: Arc<dyn ActionSender>) -> Self {
        Self { runner, actions }
    }

    /// Sends a hang-up to `module`: straight to `pid` when known, else via
    /// the shell by name. Returns whether a signal was delivered or the shell
    /// chain reported success.
    pub fn reload(&self, module: &str, pid: Option<u32>) -> bool {
        let module = base_name(module);
        if let Some(pid) = pid {
            match send_signal(pid, Signal::SIGHUP) {
                Ok(()) => {
                    info!(target: RELOADER_TARGET, module, pid, "sent reload signal");
                    return true;
                }
                Err(errno) => {
                    debug!(
                        target: RELOADER_TARGET,
                        module,
                        pid,
                        error = %errno,
                        "direct reload signal failed; trying shell"
                    );
                }
            }
        }
        let script = chain_script(RELOAD_CHAIN, &KillTarget::new(module, pid), Some("HUP"));
        let result = self.runner.run(RunRequest::new(script));
        if !result.is_success() {
            warn!(
                target: RELOADER_TARGET,
                module,
                outcome = %result.outcome,
                "reload via shell failed"
            );
        }
        result.is_success()
    }

    /// Requests a full restart from the control loop.
    pub fn request_restart(&self) -> bool {
        info!(target: RELOADER_TARGET, "requesting daemon restart");
        self.actions.send(Action::Restart)
    }
}

impl std::fmt::Debug for Reloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reloader").finish_non_exhaustive()
    }
}
