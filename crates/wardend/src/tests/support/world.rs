//! Shared world for the supervision behaviour suites.
//!
//! Collaborators are assembled lazily on first use so `given` steps can
//! still adjust the host, network, and connectivity doubles.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;
use warden_config::Config;

use super::doubles::{MockActions, MockChecker, MockHost, MockInstaller, MockNetwork, MockPolicy};
use super::{RecordingPublisher, RecordingReporter, ScriptedDaemon, fast_timings, wait_until};
use crate::actions::Action;
use crate::collaborators::Collaborators;
use crate::daemon::Warden;
use crate::dependent::{DependentDaemon, DependentSupervisor, REVERSE_PROXY};
use crate::files::SystemFileAccess;
use crate::probe::PortProbe;
use crate::process::ProcessRegistry;
use crate::state::{LifecycleState, Phase};
use crate::supervisor::{PRIMARY, PrimaryDaemon, Supervisor};

/// Upper bound for any asynchronous step to settle.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Knobs fixed once the collaborators are built.
#[derive(Debug, Clone, Copy)]
struct Conditions {
    foreground: bool,
    network_up: bool,
    connected: bool,
}

struct Assembled {
    primary: Supervisor,
    dependent: DependentSupervisor,
    warden: Warden,
}

/// Fake host running the primary and dependent supervisors.
pub struct SupervisionWorld {
    _dir: TempDir,
    config: Config,
    conditions: Conditions,
    installing: Arc<AtomicBool>,
    /// Scripted shell hosting the fake daemons.
    pub runner: Arc<ScriptedDaemon>,
    /// Published phases.
    pub publisher: Arc<RecordingPublisher>,
    /// Lifecycle notifications.
    pub reporter: Arc<RecordingReporter>,
    sent: Arc<Mutex<Vec<Action>>>,
    resets: Arc<AtomicUsize>,
    arms: Arc<AtomicUsize>,
    assembled: Option<Assembled>,
    dispatched: Vec<bool>,
}

impl SupervisionWorld {
    /// World with free ports, an attached host, and a working network.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir should be UTF-8");
        let config = Config {
            data_dir,
            socks_port: free_port(),
            proxy_port: free_port(),
            ..Config::default()
        };
        Self {
            _dir: dir,
            config,
            conditions: Conditions {
                foreground: true,
                network_up: true,
                connected: true,
            },
            installing: Arc::new(AtomicBool::new(false)),
            runner: Arc::new(ScriptedDaemon::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            reporter: Arc::new(RecordingReporter::default()),
            sent: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(AtomicUsize::new(0)),
            arms: Arc::new(AtomicUsize::new(0)),
            assembled: None,
            dispatched: Vec::new(),
        }
    }

    /// The primary daemon's configured port.
    #[must_use]
    pub const fn socks_port(&self) -> u16 {
        self.config.socks_port
    }

    /// Runs the host in the background.
    pub fn set_background(&mut self) {
        self.conditions.foreground = false;
    }

    /// Takes the host network down.
    pub fn set_network_down(&mut self) {
        self.conditions.network_up = false;
    }

    /// Pretends a configuration reset is in progress.
    pub fn set_installing(&mut self) {
        self.installing.store(true, Ordering::SeqCst);
    }

    /// Ends the configuration reset started by [`Self::set_installing`].
    pub fn finish_installing(&self) {
        self.installing.store(false, Ordering::SeqCst);
    }

    /// Makes every connectivity check fail.
    pub fn set_disconnected(&mut self) {
        self.conditions.connected = false;
    }

    /// Squats on the primary's port.
    pub fn occupy_socks_port(&self, immune: bool) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.socks_port()))
            .expect("bind squatter");
        self.runner.occupy(listener, immune);
    }

    /// Primary supervisor, assembling the world on first use.
    pub fn primary(&mut self) -> Supervisor {
        self.assemble().primary.clone()
    }

    /// Dependent supervisor, assembling the world on first use.
    pub fn dependent(&mut self) -> DependentSupervisor {
        self.assemble().dependent.clone()
    }

    /// Hands `action` to the control loop.
    pub fn handle(&mut self, action: Action) -> bool {
        self.assemble().warden.handle(action).is_break()
    }

    /// Records whether a lifecycle call was dispatched.
    pub fn record_dispatch(&mut self, dispatched: bool) {
        self.dispatched.push(dispatched);
    }

    /// Results of the recorded lifecycle calls.
    #[must_use]
    pub fn dispatched(&self) -> &[bool] {
        &self.dispatched
    }

    /// Actions sent to the control loop.
    #[must_use]
    pub fn sent(&self) -> Vec<Action> {
        self.sent.lock().expect("sent actions poisoned").clone()
    }

    /// Configuration resets requested.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Times the reconnection policy was armed.
    #[must_use]
    pub fn arms(&self) -> usize {
        self.arms.load(Ordering::SeqCst)
    }

    /// Waits until the primary publishes `phase` as its current phase.
    pub fn wait_for_primary(&mut self, phase: Phase) -> bool {
        let primary = self.primary();
        wait_until(STEP_TIMEOUT, || primary.state().phase() == phase)
    }

    /// Waits until the dependent reaches `phase`.
    pub fn wait_for_dependent(&mut self, phase: Phase) -> bool {
        let dependent = self.dependent();
        wait_until(STEP_TIMEOUT, || dependent.state().phase() == phase)
    }

    /// Waits until both supervisors are idle.
    pub fn wait_idle(&mut self) {
        self.assemble().warden.wait_idle();
    }

    fn assemble(&mut self) -> &Assembled {
        if self.assembled.is_none() {
            self.assembled = Some(self.build());
        }
        self.assembled.as_ref().expect("world assembled")
    }

    fn build(&self) -> Assembled {
        let Conditions {
            foreground,
            network_up,
            connected,
        } = self.conditions;

        let mut actions = MockActions::new();
        let sent = Arc::clone(&self.sent);
        actions.expect_send().returning(move |action| {
            sent.lock().expect("sent actions poisoned").push(action);
            true
        });
        let mut network = MockNetwork::new();
        network.expect_is_network_available().return_const(network_up);
        let network = Arc::new(network);
        let mut installer = MockInstaller::new();
        let installing = Arc::clone(&self.installing);
        installer
            .expect_is_installing()
            .returning(move || installing.load(Ordering::SeqCst));
        let resets = Arc::clone(&self.resets);
        installer.expect_reset_configuration().returning(move || {
            resets.fetch_add(1, Ordering::SeqCst);
            true
        });
        let installer = Arc::new(installer);
        let mut host = MockHost::new();
        host.expect_is_foreground().return_const(foreground);
        let mut checker = MockChecker::new();
        checker.expect_check().return_const(connected);
        let mut policy = MockPolicy::new();
        let arms = Arc::clone(&self.arms);
        policy.expect_arm().returning(move || {
            arms.fetch_add(1, Ordering::SeqCst);
        });
        policy.expect_cancel().return_const(());

        let deps = Collaborators {
            runner: self.runner.clone(),
            files: Arc::new(SystemFileAccess),
            installer: installer.clone(),
            network: network.clone(),
            host: Arc::new(host),
            actions: Arc::new(actions),
            reporter: self.reporter.clone(),
            publisher: self.publisher.clone(),
            registry: ProcessRegistry::default(),
            probe: PortProbe::default(),
            timings: fast_timings(),
        };
        let primary = Supervisor::new(
            Arc::new(LifecycleState::new(PRIMARY, self.publisher.clone())),
            &deps,
            PrimaryDaemon::from_config(&self.config),
            Arc::new(policy),
            Arc::new(checker),
        );
        let dependent = DependentSupervisor::new(
            Arc::new(LifecycleState::new(REVERSE_PROXY, self.publisher.clone())),
            &primary,
            &deps,
            DependentDaemon::from_config(&self.config),
        );
        let warden = Warden::new(
            primary.clone(),
            Some(dependent.clone()),
            network,
            installer,
            deps.timings.install_poll,
        );
        Assembled {
            primary,
            dependent,
            warden,
        }
    }
}

impl Drop for SupervisionWorld {
    fn drop(&mut self) {
        if let Some(assembled) = &self.assembled {
            let _ = assembled.warden.handle(Action::Shutdown);
            assembled.warden.wait_idle();
        }
    }
}

fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|listener| listener.local_addr())
        .map(|address| address.port())
        .expect("allocate a free port")
}
