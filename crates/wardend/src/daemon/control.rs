//! The control loop turning queued actions into supervisor calls.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::CONTROL_TARGET;
use crate::actions::Action;
use crate::dependent::DependentSupervisor;
use crate::installer::Installer;
use crate::network::NetworkReachability;
use crate::process::TaskPool;
use crate::supervisor::Supervisor;

/// The supervisors an action is applied to.
#[derive(Clone)]
struct Daemons {
    primary: Supervisor,
    dependent: Option<DependentSupervisor>,
}

impl Daemons {
    fn apply(&self, action: Action) {
        match action {
            Action::Start => {
                self.primary.start();
                if let Some(dependent) = &self.dependent {
                    dependent.start();
                }
            }
            Action::Restart => {
                self.primary.restart();
            }
            Action::Reload => {
                self.primary.reload();
            }
            Action::Stop | Action::Shutdown => {
                if let Some(dependent) = &self.dependent {
                    dependent.stop();
                }
                self.primary.stop();
            }
        }
    }
}

/// Owns the supervisors of one `wardend` process.
///
/// Start, restart, and reload requests that arrive while the daemon
/// configuration is being reset wait on a background task until the reset
/// ends. A later stop or shutdown abandons them.
pub struct Warden {
    daemons: Daemons,
    network: Arc<dyn NetworkReachability>,
    installer: Arc<dyn Installer>,
    install_poll: Duration,
    deferred: TaskPool,
    epoch: Arc<AtomicU64>,
}

impl Warden {
    /// Control loop over `primary` and, when supervised, its `dependent`.
    ///
    /// `install_poll` paces the checks made while a configuration reset
    /// holds back an action.
    pub fn new(
        primary: Supervisor,
        dependent: Option<DependentSupervisor>,
        network: Arc<dyn NetworkReachability>,
        installer: Arc<dyn Installer>,
        install_poll: Duration,
    ) -> Self {
        Self {
            daemons: Daemons { primary, dependent },
            network,
            installer,
            install_poll,
            deferred: TaskPool::new("control"),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The primary daemon's supervisor.
    #[must_use]
    pub fn primary(&self) -> &Supervisor {
        &self.daemons.primary
    }

    /// The dependent daemon's supervisor, when one is configured.
    #[must_use]
    pub fn dependent(&self) -> Option<&DependentSupervisor> {
        self.daemons.dependent.as_ref()
    }

    /// Applies one action. Breaks once the loop should end.
    pub fn handle(&self, action: Action) -> ControlFlow<()> {
        info!(target: CONTROL_TARGET, %action, "handling action");
        match action {
            Action::Start | Action::Restart | Action::Reload => self.dispatch(action),
            Action::Stop => self.stop(action),
            Action::Shutdown => {
                self.stop(action);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Consumes actions until a shutdown arrives or every sender is gone,
    /// then waits for in-flight lifecycle work.
    pub fn run(&self, actions: &Receiver<Action>) {
        while let Ok(action) = actions.recv() {
            if self.handle(action).is_break() {
                break;
            }
        }
        self.wait_idle();
        info!(target: CONTROL_TARGET, "control loop finished");
    }

    /// Blocks until deferred actions have run or been abandoned and both
    /// supervisors are idle.
    pub fn wait_idle(&self) {
        self.deferred.drain();
        if let Some(dependent) = &self.daemons.dependent {
            dependent.wait_idle();
        }
        self.daemons.primary.wait_idle();
    }

    fn dispatch(&self, action: Action) {
        if action == Action::Start && !self.network.is_network_available() {
            warn!(target: CONTROL_TARGET, "no usable network; start deferred");
            return;
        }
        if !self.installer.is_installing() {
            self.daemons.apply(action);
            return;
        }
        warn!(target: CONTROL_TARGET, %action, "configuration reset in progress; waiting");
        let daemons = self.daemons.clone();
        let installer = Arc::clone(&self.installer);
        let epoch = Arc::clone(&self.epoch);
        let issued = epoch.load(Ordering::SeqCst);
        let poll = self.install_poll;
        self.deferred.submit("deferred", move || {
            loop {
                if epoch.load(Ordering::SeqCst) != issued {
                    debug!(target: CONTROL_TARGET, %action, "deferred action abandoned");
                    return;
                }
                if !installer.is_installing() {
                    break;
                }
                thread::sleep(poll);
            }
            info!(target: CONTROL_TARGET, %action, "configuration reset finished; resuming");
            daemons.apply(action);
        });
    }

    fn stop(&self, action: Action) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.daemons.apply(action);
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("primary", &self.daemons.primary)
            .field("dependent", &self.daemons.dependent)
            .finish_non_exhaustive()
    }
}
