//! Brings up the `wardend` process and wires the supervision core.

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use tracing::info;
use warden_config::{Config, RuntimePaths};

use super::CONTROL_TARGET;
use super::control::Warden;
use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::ProcessGuard;
use super::signals::SignalForwarder;
use crate::actions::{Action, ActionSender, action_channel};
use crate::collaborators::Collaborators;
use crate::connectivity::SocksConnectivityChecker;
use crate::dependent::{DependentDaemon, DependentSupervisor, REVERSE_PROXY};
use crate::files::{FileAccess, SystemFileAccess};
use crate::health::StructuredLifecycleReporter;
use crate::host::LaunchMode;
use crate::installer::{Installer, TemplateInstaller};
use crate::network::{NetworkReachability, RouteReachability};
use crate::probe::PortProbe;
use crate::process::{ProcessRegistry, ShellRunner};
use crate::publisher::StateFilePublisher;
use crate::reconnect::{ProgressiveReconnector, ReconnectSchedule};
use crate::state::LifecycleState;
use crate::supervisor::{PRIMARY, PrimaryDaemon, Supervisor};
use crate::telemetry;
use crate::timings::SupervisionTimings;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the supervisor configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Collaborators required to launch the supervisor process.
pub(crate) struct LaunchPlan<L, D> {
    pub(crate) mode: LaunchMode,
    pub(crate) loader: L,
    pub(crate) daemonizer: D,
}

/// Runs `wardend` with the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        mode: LaunchMode::detect(),
        loader: SystemConfigLoader,
        daemonizer: SystemDaemonizer::new(),
    })
}

/// Runs `wardend` with injected collaborators.
pub(crate) fn run_daemon_with<L, D>(plan: LaunchPlan<L, D>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
{
    let LaunchPlan {
        mode,
        loader,
        daemonizer,
    } = plan;
    let config = loader.load()?;
    telemetry::initialise(&config)?;
    info!(target: CONTROL_TARGET, ?mode, "starting supervisor");

    let paths = RuntimePaths::from_config(&config)?;
    let guard = ProcessGuard::acquire(paths)?;
    if !mode.is_foreground() {
        daemonizer.daemonize(guard.paths())?;
    }
    let pid = std::process::id();
    guard.write_pid(pid)?;

    let (sender, receiver) = action_channel();
    let actions: Arc<dyn ActionSender> = Arc::new(sender);
    let warden = assemble(&config, guard.paths(), pid, mode, Arc::clone(&actions));
    let forwarder = SignalForwarder::install(Arc::clone(&actions))
        .map_err(|source| LaunchError::Signals { source })?;

    actions.send(Action::Start);
    warden.run(&receiver);
    forwarder.close();
    info!(target: CONTROL_TARGET, "shutdown sequence completed");
    Ok(())
}

/// Builds the production collaborator graph.
fn assemble(
    config: &Config,
    paths: &RuntimePaths,
    pid: u32,
    mode: LaunchMode,
    actions: Arc<dyn ActionSender>,
) -> Warden {
    let files: Arc<dyn FileAccess> = Arc::new(SystemFileAccess);
    let daemon = PrimaryDaemon::from_config(config);
    let installer: Arc<dyn Installer> = Arc::new(TemplateInstaller::new(
        daemon.paths.template.clone(),
        daemon.paths.config.clone(),
        Arc::clone(&files),
    ));
    let network: Arc<dyn NetworkReachability> = Arc::new(RouteReachability::default());
    let deps = Collaborators {
        runner: Arc::new(ShellRunner::default()),
        files,
        installer: Arc::clone(&installer),
        network: Arc::clone(&network),
        host: Arc::new(mode),
        actions: Arc::clone(&actions),
        reporter: Arc::new(StructuredLifecycleReporter::new()),
        publisher: Arc::new(StateFilePublisher::new(paths.state_path(), pid)),
        registry: ProcessRegistry::default(),
        probe: PortProbe::default(),
        timings: SupervisionTimings::default(),
    };

    let state = Arc::new(LifecycleState::new(PRIMARY, Arc::clone(&deps.publisher)));
    let policy = Arc::new(ProgressiveReconnector::new(
        Arc::clone(&state),
        Arc::clone(&network),
        actions,
        ReconnectSchedule::default(),
    )
    .clearing_before_restart(Arc::clone(&deps.files), daemon.paths.consensus_cache.clone()));
    let (check_host, check_port) = config.check_target();
    let checker = Arc::new(SocksConnectivityChecker::new(
        check_host,
        check_port,
        CHECK_TIMEOUT,
    ));
    let primary = Supervisor::new(state, &deps, daemon, policy, checker);
    let dependent = config.proxy_enabled().then(|| {
        let state = Arc::new(LifecycleState::new(
            REVERSE_PROXY,
            Arc::clone(&deps.publisher),
        ));
        DependentSupervisor::new(state, &primary, &deps, DependentDaemon::from_config(config))
    });
    Warden::new(
        primary,
        dependent,
        network,
        installer,
        deps.timings.install_poll,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::daemonizer::DaemonizeError;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    struct StaticLoader(Result<Config, Arc<OrthoError>>);

    impl ConfigLoader for StaticLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            self.0.clone()
        }
    }

    struct RefusingDaemonizer;

    impl Daemonizer for RefusingDaemonizer {
        fn daemonize(&self, _paths: &RuntimePaths) -> Result<(), DaemonizeError> {
            panic!("foreground launches never daemonize");
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        Config {
            data_dir: Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
                .expect("temp dir should be UTF-8"),
            log_format: warden_config::LogFormat::Compact,
            ..Config::default()
        }
    }

    fn plan(config: Config) -> LaunchPlan<StaticLoader, RefusingDaemonizer> {
        LaunchPlan {
            mode: LaunchMode::Foreground,
            loader: StaticLoader(Ok(config)),
            daemonizer: RefusingDaemonizer,
        }
    }

    #[test]
    fn refuses_to_start_beside_a_live_supervisor() {
        let dir = TempDir::new().expect("temp dir");
        let config = config_in(&dir);
        let paths = RuntimePaths::from_config(&config).expect("runtime paths");
        fs::write(paths.lock_path(), "").expect("write lock");
        fs::write(paths.pid_path(), format!("{}\n", std::process::id())).expect("write pid");

        let error = run_daemon_with(plan(config)).expect_err("launch must be refused");

        assert!(matches!(error, LaunchError::AlreadyRunning { .. }));
        assert!(paths.lock_path().exists(), "foreign lock is left alone");
    }
}
