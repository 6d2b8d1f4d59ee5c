//! Launches the dependent reverse proxy.

use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_config::ProxyPaths;

use super::{LAUNCHER_TARGET, command, log_failure};
use crate::actions::{Action, ActionSender};
use crate::collaborators::Collaborators;
use crate::health::LifecycleReporter;
use crate::process::{ChildSlot, CommandResult, ExitOutcome, ProcessRunner, RunRequest};
use crate::state::{LifecycleState, Phase};

/// Launches the dependent daemon.
///
/// Same exit policy as [`Launcher`](super::Launcher) without transport
/// substitution, readiness detection, or configuration resets. A failure
/// while the primary is running stops the pair.
pub struct ProxyLauncher {
    state: Arc<LifecycleState>,
    primary: Arc<LifecycleState>,
    runner: Arc<dyn ProcessRunner>,
    actions: Arc<dyn ActionSender>,
    reporter: Arc<dyn LifecycleReporter>,
    paths: ProxyPaths,
    proxy_port: u16,
}

impl ProxyLauncher {
    /// Launcher for the proxy depending on the daemon behind `primary`.
    pub fn new(
        state: Arc<LifecycleState>,
        primary: Arc<LifecycleState>,
        deps: &Collaborators,
        paths: ProxyPaths,
        proxy_port: u16,
    ) -> Self {
        Self {
            state,
            primary,
            runner: Arc::clone(&deps.runner),
            actions: Arc::clone(&deps.actions),
            reporter: Arc::clone(&deps.reporter),
            paths,
            proxy_port,
        }
    }

    /// Resolved proxy locations.
    #[must_use]
    pub fn paths(&self) -> &ProxyPaths {
        &self.paths
    }

    /// Runs the proxy until it exits, forwarding to the primary's
    /// `socks_port`.
    pub fn run(&self, slot: &ChildSlot, socks_port: u16) -> ExitOutcome {
        let script = command::proxy_command(&self.paths, self.proxy_port, socks_port);
        let daemon = self.state.daemon();
        let listener = |line: &str| {
            debug!(target: LAUNCHER_TARGET, daemon, line, "proxy output");
        };
        info!(target: LAUNCHER_TARGET, daemon, %script, "launching proxy");
        let result = self.runner.run(
            RunRequest::new(script)
                .with_env("LD_LIBRARY_PATH", self.paths.library_dir.as_str())
                .with_listener(&listener)
                .with_slot(slot),
        );
        self.handle_result(&result);
        result.outcome
    }

    fn handle_result(&self, result: &CommandResult) {
        let daemon = self.state.daemon();
        let phase = self.state.phase();
        if result.is_success() {
            info!(target: LAUNCHER_TARGET, daemon, %phase, "proxy exited cleanly");
            if phase == Phase::Running {
                self.state.set_phase(Phase::Stopped);
            }
            return;
        }

        log_failure(daemon, self.paths.binary.as_str(), result);
        if phase == Phase::Restarting {
            return;
        }
        let escalate = !matches!(phase, Phase::Stopping | Phase::Stopped)
            && self.primary.phase() == Phase::Running;
        self.state.set_phase(Phase::Stopped);
        self.reporter.daemon_stopped(daemon, result.outcome);
        if escalate {
            warn!(target: LAUNCHER_TARGET, daemon, "proxy failed; stopping the pair");
            self.actions.send(Action::Stop);
        }
    }
}

impl std::fmt::Debug for ProxyLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyLauncher")
            .field("paths", &self.paths)
            .field("proxy_port", &self.proxy_port)
            .finish_non_exhaustive()
    }
}
