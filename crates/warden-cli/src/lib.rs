//! Control CLI for the warden supervisor.
//!
//! `warden` parses leading configuration flags with the same loader the
//! supervisor uses, then performs one lifecycle command against the
//! supervisor recorded in the runtime directory. Output goes to the injected
//! writers so tests can capture it.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

mod cli;
mod config;
mod errors;
mod lifecycle;

use cli::Cli;
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
use config::{command_arguments, split_config_arguments};
pub(crate) use errors::AppError;
use lifecycle::{LifecycleContext, LifecycleHandler, LifecycleOutput, SystemLifecycle};
pub use lifecycle::WARDEND_BIN_ENV_VAR;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with(
        args,
        stdout,
        stderr,
        &OrthoConfigLoader,
        &SystemLifecycle::default(),
    )
}

/// Runs the CLI with injected configuration loading and lifecycle handling.
pub(crate) fn run_with<I, W, E, L, H>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    handler: &H,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    H: LifecycleHandler,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(command_arguments(&args, &split)) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            return match write!(stdout, "{error}") {
                Ok(()) => ExitCode::SUCCESS,
                Err(source) => report(stderr, &AppError::EmitUsage(source)),
            };
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };

    let result = loader.load(&split.config_arguments).and_then(|config| {
        let context = LifecycleContext {
            config: &config,
            config_arguments: &split.config_arguments,
        };
        let mut output = LifecycleOutput::new(&mut *stdout, &mut *stderr);
        handler.handle(cli.command.into(), context, &mut output)
    });

    match result {
        Ok(exit_code) => exit_code,
        Err(error) => report(stderr, &error),
    }
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    // Nothing else can be done if stderr itself is gone.
    writeln!(stderr, "{error}").ok();
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests;
