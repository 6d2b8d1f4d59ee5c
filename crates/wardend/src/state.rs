//! Lifecycle state register shared by every component supervising a daemon.
//!
//! Each field is an independent atomic. There is no multi-field transaction:
//! a reader may briefly observe `phase == Stopped` alongside a stale raw
//! `ready` flag, which is why [`LifecycleState::is_ready`] gates the flag on
//! the phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::publisher::ConfigurationPublisher;

const STATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::state");

/// Lifecycle stage of a supervised daemon.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Phase {
    /// No lifecycle information yet.
    Undefined = 0,
    /// Not running.
    Stopped = 1,
    /// A start sequence is in flight.
    Starting = 2,
    /// The execution unit is alive.
    Running = 3,
    /// A termination is in flight.
    Stopping = 4,
    /// A full restart is in flight; supersedes starting and stopping.
    Restarting = 5,
}

impl Phase {
    /// Maps the phase onto the values external observers understand.
    ///
    /// `Stopped`, `Starting`, and `Running` pass through, `Restarting`
    /// publishes as `Starting`, and anything else publishes as `Stopped`.
    #[must_use]
    pub const fn published(self) -> Self {
        match self {
            Self::Stopped | Self::Starting | Self::Running => self,
            Self::Restarting => Self::Starting,
            Self::Undefined | Self::Stopping => Self::Stopped,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Stopped,
            2 => Self::Starting,
            3 => Self::Running,
            4 => Self::Stopping,
            5 => Self::Restarting,
            _ => Self::Undefined,
        }
    }
}

/// Point-in-time copy of a [`LifecycleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Daemon-reported readiness, gated on `phase == Running`.
    pub ready: bool,
    /// Last connectivity verdict.
    pub connection_available: bool,
}

/// Atomic register holding one daemon's phase and flags.
pub struct LifecycleState {
    daemon: &'static str,
    phase: AtomicU8,
    ready: AtomicBool,
    connection_available: AtomicBool,
    publisher: Arc<dyn ConfigurationPublisher>,
}

impl LifecycleState {
    /// Creates a register for `daemon` starting in [`Phase::Stopped`].
    ///
    /// The initial phase is not published; the first [`set_phase`] is.
    ///
    /// [`set_phase`]: Self::set_phase
    pub fn new(daemon: &'static str, publisher: Arc<dyn ConfigurationPublisher>) -> Self {
        Self {
            daemon,
            phase: AtomicU8::new(Phase::Stopped as u8),
            ready: AtomicBool::new(false),
            connection_available: AtomicBool::new(false),
            publisher,
        }
    }

    /// Logical name of the daemon this register describes.
    #[must_use]
    pub const fn daemon(&self) -> &'static str {
        self.daemon
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_raw(self.phase.load(Ordering::SeqCst))
    }

    /// Overwrites the phase and publishes the mapped value.
    ///
    /// Publication failures are logged and swallowed.
    pub fn set_phase(&self, phase: Phase) {
        let previous = Phase::from_raw(self.phase.swap(phase as u8, Ordering::SeqCst));
        debug!(
            target: STATE_TARGET,
            daemon = self.daemon,
            %previous,
            %phase,
            "phase changed"
        );
        if let Err(error) = self.publisher.publish(self.daemon, phase.published()) {
            warn!(
                target: STATE_TARGET,
                daemon = self.daemon,
                %phase,
                error = %error,
                "failed to publish phase"
            );
        }
    }

    /// Readiness as consumers should see it: only true while running.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.phase() == Phase::Running
    }

    /// Records the daemon's own readiness signal.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Last connectivity verdict recorded while running.
    #[must_use]
    pub fn is_connection_available(&self) -> bool {
        self.connection_available.load(Ordering::SeqCst)
    }

    /// Records a connectivity verdict.
    pub fn set_connection_available(&self, available: bool) {
        self.connection_available.store(available, Ordering::SeqCst);
    }

    /// Copies every field.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.phase(),
            ready: self.is_ready(),
            connection_available: self.is_connection_available(),
        }
    }
}

impl std::fmt::Debug for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleState")
            .field("daemon", &self.daemon)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
