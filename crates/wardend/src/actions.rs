//! Lifecycle requests routed to the daemon control loop.
//!
//! Components that need to trigger a lifecycle change they do not own (the
//! launcher requesting a restart, the reconnection policy, a failing
//! dependent) send an [`Action`] instead of calling the supervisor directly.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use strum::{Display, EnumString};
use tracing::warn;

/// Request understood by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Action {
    /// Start the primary daemon (and its dependent).
    Start,
    /// Stop both daemons.
    Stop,
    /// Fully restart the primary daemon.
    Restart,
    /// Reload the primary daemon's configuration in place.
    Reload,
    /// Stop everything and leave the control loop.
    Shutdown,
}

/// Delivers actions to the control loop.
pub trait ActionSender: Send + Sync {
    /// Queues `action`; false once the control loop has gone away.
    fn send(&self, action: Action) -> bool;
}

impl<T> ActionSender for Arc<T>
where
    T: ActionSender + ?Sized,
{
    fn send(&self, action: Action) -> bool {
        (**self).send(action)
    }
}

/// [`ActionSender`] backed by an in-process channel.
#[derive(Debug)]
pub struct ChannelActionSender {
    sender: Mutex<Sender<Action>>,
}

impl ActionSender for ChannelActionSender {
    fn send(&self, action: Action) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let delivered = sender.send(action).is_ok();
        if !delivered {
            warn!(
                target: concat!(env!("CARGO_PKG_NAME"), "::control"),
                %action,
                "control loop is gone; dropping action"
            );
        }
        delivered
    }
}

/// Creates a connected sender and receiver pair.
#[must_use]
pub fn action_channel() -> (ChannelActionSender, Receiver<Action>) {
    let (sender, receiver) = mpsc::channel();
    (
        ChannelActionSender {
            sender: Mutex::new(sender),
        },
        receiver,
    )
}
