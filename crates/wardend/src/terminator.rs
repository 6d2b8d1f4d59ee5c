//! Escalating shutdown of a supervised daemon.
//!
//! Each attempt signals the PID directly when one is known and then runs a
//! chain of shell kill tools, most privileged first. Every link in the chain
//! is suffixed with `|| true` so a missing tool never aborts the rest.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use strum::Display;
use tracing::{debug, error, info, warn};

use crate::errors::SupervisionError;
use crate::health::LifecycleReporter;
use crate::process::{
    ExecutionHandle, ProcessRunner, RunRequest, Signal, check_process, send_signal,
};
use crate::state::{LifecycleState, Phase};
use crate::timings::SupervisionTimings;

const TERMINATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::terminator");

/// How a kill tool names the process it signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Addressing {
    /// `tool -s SIG <pid>`
    Pid,
    /// `tool -SIG <name>`
    Name,
    /// `tool -SIGSIG <name>`
    PrefixedName,
}

/// One entry of an escalation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KillStrategy {
    tool: &'static str,
    addressing: Addressing,
}

impl KillStrategy {
    const fn by_pid(tool: &'static str) -> Self {
        Self {
            tool,
            addressing: Addressing::Pid,
        }
    }

    const fn by_name(tool: &'static str) -> Self {
        Self {
            tool,
            addressing: Addressing::Name,
        }
    }

    const fn by_prefixed_name(tool: &'static str) -> Self {
        Self {
            tool,
            addressing: Addressing::PrefixedName,
        }
    }

    /// Renders the command, or `None` when the target cannot be addressed.
    fn command(self, target: &KillTarget<'_>, signal: Option<&str>) -> Option<String> {
        let command = match (self.addressing, target) {
            (Addressing::Pid, KillTarget::Pid(pid)) => match signal {
                Some(signal) => format!("{} -s {signal} {pid}", self.tool),
                None => format!("{} {pid}", self.tool),
            },
            (Addressing::Name, KillTarget::Name(name)) => match signal {
                Some(signal) => format!("{} -{signal} {name}", self.tool),
                None => format!("{} {name}", self.tool),
            },
            (Addressing::PrefixedName, KillTarget::Name(name)) => match signal {
                Some(signal) => format!("{} -SIG{signal} {name}", self.tool),
                None => format!("{} {name}", self.tool),
            },
            _ => return None,
        };
        Some(format!("{command} || true"))
    }
}

/// What the shell chain addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KillTarget<'a> {
    /// A PID read from the daemon's PID file.
    Pid(u32),
    /// The daemon's executable base name.
    Name(&'a str),
}

impl<'a> KillTarget<'a> {
    /// Prefers the PID when one is known.
    pub(crate) fn new(module: &'a str, pid: Option<u32>) -> Self {
        pid.map_or(Self::Name(module), Self::Pid)
    }
}

/// Termination chain, most privileged tool first.
pub(crate) const TERMINATION_CHAIN: &[KillStrategy] = &[
    KillStrategy::by_pid("toolbox kill"),
    KillStrategy::by_pid("toybox kill"),
    KillStrategy::by_pid("kill"),
    KillStrategy::by_name("toybox pkill"),
    KillStrategy::by_name("pkill"),
];

/// Hang-up chain used by the reloader when no PID is known.
pub(crate) const RELOAD_CHAIN: &[KillStrategy] = &[
    KillStrategy::by_pid("kill"),
    KillStrategy::by_prefixed_name("toybox pkill"),
    KillStrategy::by_name("pkill"),
];

/// Renders every applicable link of `chain` as one shell script.
pub(crate) fn chain_script(
    chain: &[KillStrategy],
    target: &KillTarget<'_>,
    signal: Option<&str>,
) -> String {
    chain
        .iter()
        .filter_map(|strategy| strategy.command(target, signal))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal result of a termination sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TerminationOutcome {
    /// The process is confirmed gone.
    Stopped,
    /// Nothing could be observed; the shell reported success.
    Unconfirmed,
    /// The process outlived every attempt.
    Survived,
}

/// Strips any directory prefix from a module name.
pub(crate) fn base_name(module: &str) -> &str {
    Path::new(module)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(module)
}

/// Stops one supervised daemon by any available means.
pub struct Terminator {
    state: Arc<LifecycleState>,
    runner: Arc<dyn ProcessRunner>,
    reporter: Arc<dyn LifecycleReporter>,
    timings: SupervisionTimings,
    lock: Mutex<()>,
}

impl Terminator {
    /// Terminator updating `state` as it works.
    pub fn new(
        state: Arc<LifecycleState>,
        runner: Arc<dyn ProcessRunner>,
        reporter: Arc<dyn LifecycleReporter>,
        timings: SupervisionTimings,
    ) -> Self {
        Self {
            state,
            runner,
            reporter,
            timings,
            lock: Mutex::new(()),
        }
    }

    /// Serialises a caller against in-flight terminations of this daemon.
    pub(crate) fn serialize(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops `module`, escalating until it is observed gone.
    ///
    /// A tracked `handle` is the ground truth for liveness. Without one the
    /// PID is probed, and without either the shell's own report is taken as
    /// advisory success.
    pub fn stop(
        &self,
        module: &str,
        pid: Option<u32>,
        handle: Option<&Arc<ExecutionHandle>>,
    ) -> TerminationOutcome {
        let module = base_name(module);
        // STOPPING is visible even while another termination holds the lock.
        let restarting = self.state.phase() == Phase::Restarting;
        if !restarting {
            self.state.set_phase(Phase::Stopping);
        }
        let _serial = self.serialize();
        info!(target: TERMINATOR_TARGET, module, ?pid, restarting, "stopping process");

        let outcome = if handle.is_some_and(|handle| !handle.is_alive()) {
            debug!(target: TERMINATOR_TARGET, module, "execution unit already finished");
            TerminationOutcome::Stopped
        } else {
            self.escalate(module, pid, handle)
        };
        self.finish(module, outcome, restarting);
        outcome
    }

    fn escalate(
        &self,
        module: &str,
        pid: Option<u32>,
        handle: Option<&Arc<ExecutionHandle>>,
    ) -> TerminationOutcome {
        let target = KillTarget::new(module, pid);
        let last = self.timings.escalation.len().saturating_sub(1);
        for (attempt, delay) in self.timings.escalation.iter().enumerate() {
            let force = attempt == last;
            let shell_succeeded = self.attempt(&target, pid, force);
            let outcome = observe(pid, handle, *delay, shell_succeeded);
            debug!(
                target: TERMINATOR_TARGET,
                module,
                attempt = attempt + 1,
                force,
                ?outcome,
                "termination attempt finished"
            );
            if let Some(outcome) = outcome {
                return outcome;
            }
        }

        let Some(handle) = handle else {
            return TerminationOutcome::Survived;
        };
        for attempt in 1..=self.timings.interrupt_attempts {
            warn!(target: TERMINATOR_TARGET, module, attempt, "interrupting execution unit");
            handle.interrupt();
            if handle.wait_finished(self.timings.interrupt_grace) {
                return TerminationOutcome::Stopped;
            }
        }
        TerminationOutcome::Survived
    }

    fn attempt(&self, target: &KillTarget<'_>, pid: Option<u32>, force: bool) -> bool {
        if let Some(pid) = pid {
            let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            if let Err(errno) = send_signal(pid, signal) {
                debug!(
                    target: TERMINATOR_TARGET,
                    pid,
                    signal = signal.as_str(),
                    error = %errno,
                    "direct signal failed"
                );
            }
        }
        let script = chain_script(TERMINATION_CHAIN, target, force.then_some("KILL"));
        self.runner.run(RunRequest::new(script)).is_success()
    }

    fn finish(&self, module: &str, outcome: TerminationOutcome, restarting: bool) {
        match outcome {
            TerminationOutcome::Survived => {
                let error = SupervisionError::ProcessNotTerminated {
                    module: module.to_owned(),
                };
                error!(target: TERMINATOR_TARGET, error = %error, "termination exhausted");
                self.state.set_phase(Phase::Running);
            }
            TerminationOutcome::Stopped | TerminationOutcome::Unconfirmed => {
                info!(target: TERMINATOR_TARGET, module, %outcome, "process stopped");
                if !restarting {
                    self.state.set_phase(Phase::Stopped);
                }
            }
        }
        if !restarting {
            self.reporter.termination_finished(module, outcome);
        }
    }
}

/// Waits out an attempt's delay and decides whether it worked.
fn observe(
    pid: Option<u32>,
    handle: Option<&Arc<ExecutionHandle>>,
    delay: Duration,
    shell_succeeded: bool,
) -> Option<TerminationOutcome> {
    if let Some(handle) = handle {
        return handle
            .wait_finished(delay)
            .then_some(TerminationOutcome::Stopped);
    }
    thread::sleep(delay);
    match pid {
        Some(pid) => matches!(check_process(pid), Ok(false)).then_some(TerminationOutcome::Stopped),
        None => shell_succeeded.then_some(TerminationOutcome::Unconfirmed),
    }
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminator")
            .field("daemon", &self.state.daemon())
            .finish_non_exhaustive()
    }
}
