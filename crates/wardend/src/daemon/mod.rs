//! The `wardend` process: singleton guard, daemonisation, signal handling,
//! and the control loop.

pub(crate) mod daemonizer;
mod control;
mod errors;
mod guard;
mod launch;
mod signals;

pub use control::Warden;
pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::LaunchError;
pub use launch::{ConfigLoader, SystemConfigLoader, run_daemon};
pub use signals::{FORWARDED_SIGNALS, SignalForwarder, action_for};

pub(crate) const CONTROL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::control");
