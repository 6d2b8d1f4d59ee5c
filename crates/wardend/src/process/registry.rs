//! Discovery of execution units whose owner has gone away.

use std::sync::{Arc, Mutex, PoisonError};

use super::handle::ExecutionHandle;

/// Process-wide list of live execution units, looked up by logical name.
///
/// A supervisor registers every unit it spawns. A later supervisor built on
/// the same registry can adopt a unit that is still alive instead of
/// launching a second daemon. Finished units are pruned on every access.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    units: Arc<Mutex<Vec<Arc<ExecutionHandle>>>>,
}

impl ProcessRegistry {
    /// Records `handle` for later discovery.
    pub fn register(&self, handle: &Arc<ExecutionHandle>) {
        let mut units = self.units.lock().unwrap_or_else(PoisonError::into_inner);
        units.retain(|unit| unit.is_alive());
        units.push(Arc::clone(handle));
    }

    /// Returns the first live unit called `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ExecutionHandle>> {
        let mut units = self.units.lock().unwrap_or_else(PoisonError::into_inner);
        units.retain(|unit| unit.is_alive());
        units.iter().find(|unit| unit.name() == name).cloned()
    }
}
