//! Configuration loading helpers for the warden CLI.
//!
//! Leading configuration flags are split from the subcommand so the loader
//! only sees flags it understands and the same flags can be forwarded to a
//! freshly spawned `wardend`.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use warden_config::Config;

use crate::AppError;

/// Configuration flags accepted ahead of the subcommand.
///
/// Each entry pairs the flag with whether it consumes a value. Keep in sync
/// with the fields of [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[(&str, bool)] = &[
    ("--config-path", true),
    ("--log-filter", true),
    ("--log-format", true),
    ("--data-dir", true),
    ("--library-dir", true),
    ("--daemon-binary", true),
    ("--daemon-config", true),
    ("--daemon-config-template", true),
    ("--daemon-pid-file", true),
    ("--daemon-log-file", true),
    ("--socks-port", true),
    ("--obfs4-transport", true),
    ("--snowflake-transport", true),
    ("--webtunnel-transport", true),
    ("--proxy-binary", true),
    ("--proxy-pid-file", true),
    ("--proxy-port", true),
    ("--check-host", true),
    ("--check-port", true),
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name followed by config flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let mut parts = text.splitn(2, '=');
    let flag = parts.next().unwrap_or_default();
    let has_inline_value = parts.next().is_some();
    CONFIG_CLI_FLAGS
        .iter()
        .find(|(known, _)| *known == flag)
        .map_or(FlagAction::Skip, |(_, takes_value)| FlagAction::Include {
            needs_value: *takes_value && !has_inline_value,
        })
}

/// Configuration arguments and the index where the subcommand begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some(program) = args.first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };
    let mut config_arguments = vec![program.clone()];
    let mut index = 1;
    while let Some(argument) = args.get(index) {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                index += 1;
                if needs_value {
                    if let Some(value) = args.get(index) {
                        config_arguments.push(value.clone());
                        index += 1;
                    }
                }
            }
            FlagAction::Skip => break,
        }
    }
    ConfigArgumentSplit {
        config_arguments,
        command_start: index,
    }
}

/// Program name followed by everything from the subcommand onwards.
pub(crate) fn command_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    args.first()
        .into_iter()
        .chain(args.iter().skip(split.command_start.max(1)))
        .cloned()
        .collect()
}
