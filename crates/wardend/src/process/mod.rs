//! Process-level primitives: shell execution, exit classification, signal
//! delivery, execution handles, and per-daemon dispatch.

mod handle;
mod outcome;
mod registry;
mod runner;
mod signals;
mod worker;

pub use handle::ExecutionHandle;
pub use outcome::{CommandResult, ExitOutcome};
pub use registry::ProcessRegistry;
pub use runner::{ChildSlot, LineListener, ProcessRunner, RunRequest, ShellRunner};
pub use signals::{Signal, check_process, send_signal};
pub use worker::{ExclusiveGate, GateGuard, TaskPool};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
