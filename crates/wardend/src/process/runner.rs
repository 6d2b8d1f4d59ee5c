//! Shell execution with incremental output delivery and cancellable waits.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

use super::PROCESS_TARGET;
use super::outcome::{CommandResult, ExitOutcome};
use super::signals::{Signal, send_signal};

/// Lines of daemon stdout retained after streaming them to the listener.
const OUTPUT_TAIL_LINES: usize = 256;

/// Receives standard output lines as soon as the child prints them.
pub trait LineListener: Send + Sync {
    /// Called once per line, without the trailing newline.
    fn on_line(&self, line: &str);
}

impl<F> LineListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_line(&self, line: &str) {
        self(line);
    }
}

#[derive(Debug, Default)]
struct SlotState {
    pid: Option<u32>,
    cancelled: bool,
}

/// Shared record of the child a runner is waiting on.
///
/// Cancelling the slot kills the attached child, which ends the blocking
/// wait in [`ProcessRunner::run`]. A cancel that arrives before the child is
/// attached kills it as soon as it is.
#[derive(Debug, Clone, Default)]
pub struct ChildSlot {
    state: Arc<Mutex<SlotState>>,
}

impl ChildSlot {
    /// Records the spawned child.
    pub fn attach(&self, pid: u32) {
        let mut state = self.lock();
        state.pid = Some(pid);
        if state.cancelled {
            kill_child(pid);
        }
    }

    /// Forgets the child after it has been reaped.
    pub fn detach(&self) {
        self.lock().pid = None;
    }

    /// PID of the attached child, if one is running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock().pid
    }

    /// Marks the wait as cancelled and kills the attached child.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        if let Some(pid) = state.pid {
            kill_child(pid);
        }
    }

    /// Reports whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn kill_child(pid: u32) {
    if let Err(error) = send_signal(pid, Signal::SIGKILL) {
        warn!(target: PROCESS_TARGET, pid, error = %error, "failed to kill child");
    }
}

/// A script plus the optional hooks a run may use.
pub struct RunRequest<'a> {
    /// Script passed to `sh -c`.
    pub script: String,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Receives stdout lines incrementally.
    pub listener: Option<&'a dyn LineListener>,
    /// Records the child so the wait can be cancelled.
    pub slot: Option<&'a ChildSlot>,
}

impl<'a> RunRequest<'a> {
    /// Request running `script` with no hooks.
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            env: Vec::new(),
            listener: None,
            slot: None,
        }
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Streams stdout lines to `listener`.
    #[must_use]
    pub fn with_listener(mut self, listener: &'a dyn LineListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Records the child in `slot`.
    #[must_use]
    pub fn with_slot(mut self, slot: &'a ChildSlot) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Executes shell scripts to completion.
pub trait ProcessRunner: Send + Sync {
    /// Runs the request, blocking until the shell exits.
    fn run(&self, request: RunRequest<'_>) -> CommandResult;
}

/// [`ProcessRunner`] backed by `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl ShellRunner {
    /// Runner using `shell` instead of `/bin/sh`.
    #[must_use]
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl ProcessRunner for ShellRunner {
    fn run(&self, request: RunRequest<'_>) -> CommandResult {
        let RunRequest {
            script,
            env,
            listener,
            slot,
        } = request;
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&script)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(target: PROCESS_TARGET, script = %script, "running shell script");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                let outcome = spawn_outcome(&error);
                warn!(
                    target: PROCESS_TARGET,
                    shell = %self.shell.display(),
                    %outcome,
                    error = %error,
                    "failed to start shell"
                );
                return CommandResult::failed(outcome, error.to_string());
            }
        };
        if let Some(slot) = slot {
            slot.attach(child.id());
        }

        let stderr_reader = child.stderr.take().and_then(|pipe| {
            thread::Builder::new()
                .name("stderr-reader".into())
                .spawn(move || read_tail(pipe, None, usize::MAX))
                .ok()
        });
        let stdout = child
            .stdout
            .take()
            .map(|pipe| read_tail(pipe, listener, OUTPUT_TAIL_LINES))
            .unwrap_or_default();
        let status = child.wait();
        let cancelled = slot.is_some_and(ChildSlot::is_cancelled);
        if let Some(slot) = slot {
            slot.detach();
        }
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        let outcome = match status {
            Ok(status) => classify(status, cancelled),
            Err(error) => {
                warn!(target: PROCESS_TARGET, error = %error, "lost track of shell");
                ExitOutcome::ShellDied
            }
        };
        CommandResult {
            outcome,
            stdout,
            stderr,
        }
    }
}

fn read_tail(pipe: impl Read, listener: Option<&dyn LineListener>, keep: usize) -> Vec<String> {
    let mut tail = VecDeque::new();
    for line in BufReader::new(pipe).lines() {
        let Ok(line) = line else { break };
        if let Some(listener) = listener {
            listener.on_line(&line);
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

fn classify(status: ExitStatus, cancelled: bool) -> ExitOutcome {
    if cancelled {
        return ExitOutcome::WatchdogExit;
    }
    status
        .code()
        .map_or(ExitOutcome::Terminated, ExitOutcome::from_code)
}

fn spawn_outcome(error: &std::io::Error) -> ExitOutcome {
    match error.kind() {
        std::io::ErrorKind::NotFound => ExitOutcome::ShellNotFound,
        std::io::ErrorKind::PermissionDenied => ExitOutcome::ShellWrongPrivilege,
        _ => ExitOutcome::ShellExecFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[rstest]
    #[case("exit 0", ExitOutcome::Success)]
    #[case("exit 3", ExitOutcome::Failed(3))]
    #[case("exec /definitely/missing/daemon", ExitOutcome::CommandNotFound)]
    #[case("exec /dev/null", ExitOutcome::CommandNotExecutable)]
    #[case("kill -9 $$", ExitOutcome::Terminated)]
    fn classifies_exit_status(#[case] script: &str, #[case] expected: ExitOutcome) {
        let result = ShellRunner::default().run(RunRequest::new(script));
        assert_eq!(result.outcome, expected, "stderr: {:?}", result.stderr);
    }

    #[test]
    fn missing_shell_is_shell_not_found() {
        let runner = ShellRunner::with_shell("/definitely/missing/sh");
        let result = runner.run(RunRequest::new("true"));
        assert_eq!(result.outcome, ExitOutcome::ShellNotFound);
        assert_eq!(result.stderr.len(), 1);
    }

    #[test]
    fn streams_lines_and_captures_both_pipes() {
        let seen = Mutex::new(Vec::new());
        let listener = |line: &str| {
            seen.lock().expect("listener mutex").push(line.to_owned());
        };
        let result = ShellRunner::default().run(
            RunRequest::new("echo one; echo two; echo oops >&2; echo \"$GREETING\"")
                .with_env("GREETING", "hello")
                .with_listener(&listener),
        );
        assert!(result.is_success());
        assert_eq!(result.stdout, ["one", "two", "hello"]);
        assert_eq!(result.stderr, ["oops"]);
        assert_eq!(*seen.lock().expect("listener mutex"), ["one", "two", "hello"]);
    }

    #[test]
    fn cancelling_the_slot_ends_the_wait() {
        let slot = ChildSlot::default();
        let canceller = slot.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            while canceller.pid().is_none() {
                thread::sleep(Duration::from_millis(5));
            }
            canceller.cancel();
        });
        let result = ShellRunner::default().run(RunRequest::new("exec sleep 30").with_slot(&slot));
        handle.join().expect("canceller thread");
        assert_eq!(result.outcome, ExitOutcome::WatchdogExit);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(slot.pid(), None);
    }

    #[test]
    fn cancel_before_attach_kills_on_attach() {
        let slot = ChildSlot::default();
        slot.cancel();
        let result = ShellRunner::default().run(RunRequest::new("exec sleep 30").with_slot(&slot));
        assert_eq!(result.outcome, ExitOutcome::WatchdogExit);
    }
}
