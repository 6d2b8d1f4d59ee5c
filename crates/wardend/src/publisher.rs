//! Publication of lifecycle phases for observers outside the supervisor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::atomic_write;
use crate::state::Phase;

/// Persists the published phase of each supervised daemon.
pub trait ConfigurationPublisher: Send + Sync {
    /// Records `phase` for `daemon`. Only mapped phases are ever passed.
    fn publish(&self, daemon: &str, phase: Phase) -> Result<(), PublishError>;
}

/// Errors raised while publishing a phase.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Writing the snapshot failed.
    #[error("failed to write state snapshot '{path}': {source}")]
    Io {
        /// Snapshot path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Serialising the snapshot failed.
    #[error("failed to serialise state snapshot: {source}")]
    Serialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
}

/// JSON document written to the runtime directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    /// PID of the supervisor that wrote the document.
    pub pid: u32,
    /// Seconds since the Unix epoch at write time.
    pub timestamp: u64,
    /// Published phase per daemon.
    pub daemons: BTreeMap<String, Phase>,
}

/// Publisher that rewrites a JSON state file atomically on every change.
#[derive(Debug)]
pub struct StateFilePublisher {
    path: PathBuf,
    pid: u32,
    daemons: Mutex<BTreeMap<String, Phase>>,
}

impl StateFilePublisher {
    /// Publishes into `path` on behalf of supervisor `pid`.
    #[must_use]
    pub fn new(path: &Path, pid: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            pid,
            daemons: Mutex::new(BTreeMap::new()),
        }
    }
}

impl ConfigurationPublisher for StateFilePublisher {
    fn publish(&self, daemon: &str, phase: Phase) -> Result<(), PublishError> {
        // Held across the write so concurrent publishers never reorder files.
        let mut daemons = self.daemons.lock().unwrap_or_else(PoisonError::into_inner);
        daemons.insert(daemon.to_owned(), phase);
        let document = StateDocument {
            pid: self.pid,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
            daemons: daemons.clone(),
        };
        let mut payload = serde_json::to_vec(&document)?;
        payload.push(b'\n');
        atomic_write(&self.path, &payload).map_err(|source| PublishError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
