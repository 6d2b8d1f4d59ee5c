use std::sync::Mutex;

use crate::publisher::{ConfigurationPublisher, PublishError};
use crate::state::Phase;

/// Records every published phase in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Phase)>>,
}

impl RecordingPublisher {
    /// Every `(daemon, phase)` pair published so far.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Phase)> {
        self.published
            .lock()
            .expect("publisher mutex poisoned")
            .clone()
    }

    /// Phases published for `daemon`.
    #[must_use]
    pub fn phases(&self, daemon: &str) -> Vec<Phase> {
        self.published()
            .into_iter()
            .filter(|(name, _)| name == daemon)
            .map(|(_, phase)| phase)
            .collect()
    }
}

impl ConfigurationPublisher for RecordingPublisher {
    fn publish(&self, daemon: &str, phase: Phase) -> Result<(), PublishError> {
        self.published
            .lock()
            .expect("publisher mutex poisoned")
            .push((daemon.to_owned(), phase));
        Ok(())
    }
}
