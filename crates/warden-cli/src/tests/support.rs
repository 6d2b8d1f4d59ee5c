//! Harness for exercising the CLI against a stand-in supervisor.
//!
//! A `sleep` child plays the supervisor: its pid goes into the runtime
//! directory and a reaper thread records the signal that ended it.

use std::ffi::OsString;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitCode, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use warden_config::{Config, RuntimePaths};

use crate::lifecycle::SystemLifecycle;
use crate::{AppError, ConfigLoader, run_with};

pub(super) struct StaticConfigLoader {
    config: Config,
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// Stand-in supervisor process.
pub(super) struct FakeSupervisor {
    pid: u32,
    ended_by: Arc<Mutex<Option<Option<i32>>>>,
}

impl FakeSupervisor {
    fn spawn() -> Result<Self, String> {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .spawn()
            .map_err(|error| format!("spawn sleep: {error}"))?;
        let pid = child.id();
        let ended_by = Arc::new(Mutex::new(None));
        let record = Arc::clone(&ended_by);
        thread::spawn(move || {
            let signal = child.wait().ok().and_then(|status| status.signal());
            *record.lock().unwrap_or_else(PoisonError::into_inner) = Some(signal);
        });
        Ok(Self { pid, ended_by })
    }

    /// Signal that ended the process, once it has been reaped.
    pub(super) fn wait_for_signal(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(signal) = *self.ended_by.lock().unwrap_or_else(PoisonError::into_inner) {
                return signal;
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }
}

impl Drop for FakeSupervisor {
    fn drop(&mut self) {
        if let Ok(pid) = libc::pid_t::try_from(self.pid) {
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
    }
}

pub(super) struct TestWorld {
    dir: TempDir,
    config: Config,
    binary: OsString,
    pub supervisor: Option<FakeSupervisor>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<ExitCode>,
}

impl TestWorld {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let data_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let config = Config {
            data_dir,
            ..Config::default()
        };
        Self {
            dir,
            config,
            binary: OsString::from("wardend"),
            supervisor: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
        }
    }

    fn paths(&self) -> RuntimePaths {
        RuntimePaths::in_directory(self.dir.path().to_path_buf())
    }

    pub fn start_supervisor(&mut self) -> Result<(), String> {
        let supervisor = FakeSupervisor::spawn()?;
        fs::write(self.paths().pid_path(), format!("{}\n", supervisor.pid))
            .map_err(|error| format!("write pid file: {error}"))?;
        self.supervisor = Some(supervisor);
        Ok(())
    }

    pub fn supervisor_pid(&self) -> Option<u32> {
        self.supervisor.as_ref().map(|supervisor| supervisor.pid)
    }

    pub fn write_stale_pid(&self) -> Result<(), String> {
        // Above any kernel pid_max, so no process can own it.
        fs::write(self.paths().pid_path(), "2147483646\n").map_err(|error| error.to_string())
    }

    pub fn publish_state(&self, pid: u32, daemons: &[(&str, &str)]) -> Result<(), String> {
        let daemons: serde_json::Map<String, serde_json::Value> = daemons
            .iter()
            .map(|(daemon, phase)| ((*daemon).to_owned(), serde_json::Value::from(*phase)))
            .collect();
        let document = serde_json::json!({
            "pid": pid,
            "timestamp": 1_700_000_000_u64,
            "daemons": daemons,
        });
        fs::write(self.paths().state_path(), document.to_string())
            .map_err(|error| format!("write state: {error}"))
    }

    pub fn use_binary(&mut self, binary: &str) {
        self.binary = OsString::from(binary);
    }

    pub fn run(&mut self, command: &str) {
        self.stdout.clear();
        self.stderr.clear();
        let mut args = vec![OsString::from("warden")];
        args.extend(command.split_whitespace().map(OsString::from));
        let loader = StaticConfigLoader {
            config: self.config.clone(),
        };
        let lifecycle = SystemLifecycle::with_binary(self.binary.clone());
        self.exit_code = Some(run_with(
            args,
            &mut self.stdout,
            &mut self.stderr,
            &loader,
            &lifecycle,
        ));
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[fixture]
pub(super) fn world() -> std::cell::RefCell<TestWorld> {
    std::cell::RefCell::new(TestWorld::new())
}
