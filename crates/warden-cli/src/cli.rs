//! Command-line interface for the warden control tool.

use clap::{Parser, Subcommand};

use crate::lifecycle::LifecycleCommand;

/// Controls a running `wardend` supervisor.
#[derive(Parser, Debug)]
#[command(name = "warden", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Lifecycle requests understood by the supervisor.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Launches the supervisor, or asks a running one to start its daemons.
    Start,
    /// Shuts the supervisor down and waits for it to exit.
    Stop,
    /// Asks the supervisor to restart the primary daemon.
    Restart,
    /// Asks the supervisor to reload the primary daemon's configuration.
    Reload,
    /// Prints the last published state snapshot.
    Status,
}

impl From<CliCommand> for LifecycleCommand {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Start => Self::Start,
            CliCommand::Stop => Self::Stop,
            CliCommand::Restart => Self::Restart,
            CliCommand::Reload => Self::Reload,
            CliCommand::Status => Self::Status,
        }
    }
}
