//! Supervision core of the `wardend` daemon.
//!
//! A [`Supervisor`] drives one long-running network daemon through its
//! lifecycle, a [`DependentSupervisor`] keeps a reverse proxy in step with
//! it, and the [`daemon`] module hosts both inside a singleton background
//! process controlled through POSIX signals.

pub mod actions;
pub mod collaborators;
pub mod connectivity;
pub mod daemon;
pub mod dependent;
pub mod errors;
pub mod files;
pub mod health;
pub mod host;
pub mod installer;
pub mod launcher;
pub mod network;
pub mod probe;
pub mod process;
pub mod publisher;
pub mod reconnect;
pub mod reloader;
pub mod state;
pub mod supervisor;
pub mod telemetry;
pub mod terminator;
pub mod timings;
mod unit;

pub use actions::{Action, ActionSender, ChannelActionSender, action_channel};
pub use collaborators::Collaborators;
pub use connectivity::{ConnectivityChecker, SocksConnectivityChecker};
pub use daemon::{LaunchError, Warden, run_daemon};
pub use dependent::{DependentDaemon, DependentSupervisor, REVERSE_PROXY};
pub use errors::SupervisionError;
pub use health::{LifecycleReporter, StructuredLifecycleReporter};
pub use host::{FOREGROUND_ENV_VAR, HostActivity, LaunchMode};
pub use installer::{Installer, TemplateInstaller};
pub use launcher::{Launcher, ProxyLauncher, READY_MARKER};
pub use network::{NetworkReachability, RouteReachability};
pub use probe::PortProbe;
pub use publisher::{ConfigurationPublisher, PublishError, StateDocument, StateFilePublisher};
pub use reconnect::{ProgressiveReconnector, ReconnectSchedule, ReconnectionPolicy};
pub use reloader::Reloader;
pub use state::{LifecycleState, Phase, StateSnapshot};
pub use supervisor::{PRIMARY, PrimaryDaemon, Supervisor};
pub use terminator::{TerminationOutcome, Terminator};
pub use timings::SupervisionTimings;

#[cfg(test)]
mod tests;
