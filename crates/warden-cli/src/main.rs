//! Entry point for the `warden` control CLI.
//!
//! Delegates to [`warden_cli::run`], which loads configuration and signals or
//! inspects the running supervisor.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    warden_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
