//! Whether the supervisor runs attached to an interactive host.

use std::env;

/// Environment variable that keeps `wardend` in the foreground.
pub const FOREGROUND_ENV_VAR: &str = "WARDEN_FOREGROUND";

/// Execution mode for the supervisor process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Detach from the terminal and run in the background.
    Background,
    /// Stay attached to the launching terminal.
    Foreground,
}

impl LaunchMode {
    /// Determines the launch mode from the current environment.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_value(env::var_os(FOREGROUND_ENV_VAR).as_deref())
    }

    fn from_value(value: Option<&std::ffi::OsStr>) -> Self {
        match value.and_then(|raw| raw.to_str()) {
            Some(raw) if is_truthy(raw) => Self::Foreground,
            _ => Self::Background,
        }
    }

    /// Reports whether the supervisor should remain attached.
    #[must_use]
    pub const fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground)
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Reports whether someone is actively watching the host.
///
/// While nobody is, the launcher prefers a cheap restart over leaving a
/// crashed daemon stopped.
pub trait HostActivity: Send + Sync {
    /// True when the host is in the foreground.
    fn is_foreground(&self) -> bool;
}

impl HostActivity for LaunchMode {
    fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground)
    }
}
