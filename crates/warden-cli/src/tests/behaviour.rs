//! Step definitions for `tests/features/warden_cli.feature`.

use std::cell::RefCell;
use std::process::ExitCode;
use std::time::Duration;

use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{TestWorld, world};

const SIGNAL_TIMEOUT: Duration = Duration::from_secs(5);

#[given("a running supervisor")]
fn given_running_supervisor(world: &RefCell<TestWorld>) -> Result<(), String> {
    world.borrow_mut().start_supervisor()
}

#[given("a stale pid file")]
fn given_stale_pid(world: &RefCell<TestWorld>) -> Result<(), String> {
    world.borrow().write_stale_pid()
}

#[given("the supervisor published \"{daemon}\" as \"{phase}\"")]
fn given_published_state(
    world: &RefCell<TestWorld>,
    daemon: String,
    phase: String,
) -> Result<(), String> {
    let world = world.borrow();
    let pid = world.supervisor_pid().unwrap_or(1);
    world.publish_state(pid, &[(daemon.as_str(), phase.as_str())])
}

#[given("a state snapshot from a departed supervisor")]
fn given_departed_snapshot(world: &RefCell<TestWorld>) -> Result<(), String> {
    world.borrow().publish_state(2_147_483_646, &[("primary", "RUNNING")])
}

#[given("the supervisor binary is \"{binary}\"")]
fn given_binary(world: &RefCell<TestWorld>, binary: String) {
    world.borrow_mut().use_binary(&binary);
}

#[when("the operator runs \"{command}\"")]
fn when_operator_runs(world: &RefCell<TestWorld>, command: String) {
    world.borrow_mut().run(&command);
}

#[then("the command succeeds")]
fn then_succeeds(world: &RefCell<TestWorld>) -> Result<(), String> {
    let world = world.borrow();
    match world.exit_code {
        Some(code) if code == ExitCode::SUCCESS => Ok(()),
        other => Err(format!(
            "expected success, got {other:?}; stderr: {}",
            world.stderr_text()
        )),
    }
}

#[then("the command fails")]
fn then_fails(world: &RefCell<TestWorld>) -> Result<(), String> {
    match world.borrow().exit_code {
        Some(code) if code == ExitCode::FAILURE => Ok(()),
        other => Err(format!("expected failure, got {other:?}")),
    }
}

#[then("stdout contains \"{text}\"")]
fn then_stdout_contains(world: &RefCell<TestWorld>, text: String) -> Result<(), String> {
    let stdout = world.borrow().stdout_text();
    if stdout.contains(&text) {
        Ok(())
    } else {
        Err(format!("stdout {stdout:?} lacks {text:?}"))
    }
}

#[then("stderr contains \"{text}\"")]
fn then_stderr_contains(world: &RefCell<TestWorld>, text: String) -> Result<(), String> {
    let stderr = world.borrow().stderr_text();
    if stderr.contains(&text) {
        Ok(())
    } else {
        Err(format!("stderr {stderr:?} lacks {text:?}"))
    }
}

#[then("the supervisor received \"{signal}\"")]
fn then_supervisor_received(world: &RefCell<TestWorld>, signal: String) -> Result<(), String> {
    let expected = match signal.as_str() {
        "SIGHUP" => libc::SIGHUP,
        "SIGTERM" => libc::SIGTERM,
        "SIGUSR1" => libc::SIGUSR1,
        "SIGUSR2" => libc::SIGUSR2,
        other => return Err(format!("unknown signal {other}")),
    };
    let world = world.borrow();
    let supervisor = world
        .supervisor
        .as_ref()
        .ok_or_else(|| "no supervisor was started".to_owned())?;
    match supervisor.wait_for_signal(SIGNAL_TIMEOUT) {
        Some(received) if received == expected => Ok(()),
        other => Err(format!("expected {signal}, supervisor ended with {other:?}")),
    }
}

#[scenario(path = "tests/features/warden_cli.feature")]
fn warden_cli_behaviour(#[from(world)] _: RefCell<TestWorld>) {}
