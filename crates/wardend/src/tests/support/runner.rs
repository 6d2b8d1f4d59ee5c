//! Scripted [`ProcessRunner`] doubles.
//!
//! [`ScriptedDaemon`] treats any `exec ...` script as a daemon launch that
//! blocks until a kill script names it, its slot is cancelled, or the test
//! makes it fail. Kill scripts also release a port squatter unless the
//! squatter was made immune.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::process::{ChildSlot, CommandResult, ExitOutcome, ProcessRunner, RunRequest};
use crate::terminator::base_name;

/// Records scripts and reports success for all of them.
#[derive(Debug, Default)]
pub struct ScriptLog {
    scripts: Mutex<Vec<String>>,
}

impl ScriptLog {
    /// Scripts run so far.
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().expect("script log poisoned").clone()
    }
}

impl ProcessRunner for ScriptLog {
    fn run(&self, request: RunRequest<'_>) -> CommandResult {
        self.scripts
            .lock()
            .expect("script log poisoned")
            .push(request.script);
        CommandResult::from_outcome(ExitOutcome::Success)
    }
}

/// Fake shell hosting blocking daemons.
#[derive(Debug, Default)]
pub struct ScriptedDaemon {
    scripts: Mutex<Vec<String>>,
    output: Mutex<Vec<String>>,
    crash_on_launch: Mutex<Option<ExitOutcome>>,
    failures: Mutex<Vec<(String, ExitOutcome)>>,
    squatter: Mutex<Option<TcpListener>>,
    squatter_immune: AtomicBool,
    launches: AtomicUsize,
}

impl ScriptedDaemon {
    /// Every script run so far.
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().expect("scripts poisoned").clone()
    }

    /// Scripts that tried to kill something.
    #[must_use]
    pub fn kill_scripts(&self) -> Vec<String> {
        self.scripts()
            .into_iter()
            .filter(|script| is_kill(script))
            .collect()
    }

    /// Daemon launches so far.
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Lines every launched daemon prints before blocking.
    pub fn print_on_launch(&self, line: &str) {
        self.output
            .lock()
            .expect("output poisoned")
            .push(line.to_owned());
    }

    /// Makes the next launch exit immediately with `outcome`.
    pub fn crash_next_launch(&self, outcome: ExitOutcome) {
        *self.crash_on_launch.lock().expect("crash poisoned") = Some(outcome);
    }

    /// Makes the running daemon called `name` exit with `outcome`.
    pub fn fail_running(&self, name: &str, outcome: ExitOutcome) {
        self.failures
            .lock()
            .expect("failures poisoned")
            .push((name.to_owned(), outcome));
    }

    /// Holds `listener` open until a kill script runs.
    pub fn occupy(&self, listener: TcpListener, immune: bool) {
        self.squatter_immune.store(immune, Ordering::SeqCst);
        *self.squatter.lock().expect("squatter poisoned") = Some(listener);
    }

    fn record(&self, script: &str) -> usize {
        let mut scripts = self.scripts.lock().expect("scripts poisoned");
        scripts.push(script.to_owned());
        scripts.len()
    }

    fn killed_since(&self, name: &str, seen: usize) -> bool {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .iter()
            .skip(seen)
            .any(|script| is_kill(script) && script.contains(name))
    }

    fn take_failure(&self, name: &str) -> Option<ExitOutcome> {
        let mut failures = self.failures.lock().expect("failures poisoned");
        let index = failures.iter().position(|(daemon, _)| daemon == name)?;
        Some(failures.remove(index).1)
    }

    fn run_daemon(&self, name: &str, seen: usize, request: &RunRequest<'_>) -> ExitOutcome {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(listener) = request.listener {
            for line in self.output.lock().expect("output poisoned").iter() {
                listener.on_line(line);
            }
        }
        if let Some(outcome) = self.crash_on_launch.lock().expect("crash poisoned").take() {
            return outcome;
        }
        loop {
            if request.slot.is_some_and(ChildSlot::is_cancelled) {
                return ExitOutcome::WatchdogExit;
            }
            if self.killed_since(name, seen) {
                return ExitOutcome::Terminated;
            }
            if let Some(outcome) = self.take_failure(name) {
                return outcome;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl ProcessRunner for ScriptedDaemon {
    fn run(&self, request: RunRequest<'_>) -> CommandResult {
        let seen = self.record(&request.script);
        if let Some(name) = launched_daemon(&request.script) {
            let outcome = self.run_daemon(&name, seen, &request);
            return CommandResult::from_outcome(outcome);
        }
        if is_kill(&request.script) && !self.squatter_immune.load(Ordering::SeqCst) {
            self.squatter.lock().expect("squatter poisoned").take();
        }
        CommandResult::from_outcome(ExitOutcome::Success)
    }
}

fn launched_daemon(script: &str) -> Option<String> {
    let binary = script.strip_prefix("exec ")?.split_whitespace().next()?;
    Some(base_name(binary.trim_matches('\'')).to_owned())
}

fn is_kill(script: &str) -> bool {
    script.contains("kill") && !script.contains("HUP")
}
