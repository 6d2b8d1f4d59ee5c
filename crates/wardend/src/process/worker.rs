//! Per-daemon task dispatch and the exclusive gate guarding lifecycle
//! sequences.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::error;

use super::PROCESS_TARGET;

/// Runs fire-and-forget lifecycle work on named threads and keeps their
/// join handles so callers can wait for quiescence.
#[derive(Debug)]
pub struct TaskPool {
    name: &'static str,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    /// Pool whose threads are named `<name>-<label>`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Runs `task` on a new thread. Returns false when the thread could not
    /// be created.
    pub fn submit<F>(&self, label: &str, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = format!("{}-{label}", self.name);
        match thread::Builder::new().name(thread_name.clone()).spawn(task) {
            Ok(handle) => {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                tasks.retain(|task| !task.is_finished());
                tasks.push(handle);
                true
            }
            Err(error) => {
                error!(
                    target: PROCESS_TARGET,
                    task = %thread_name,
                    error = %error,
                    "failed to dispatch lifecycle task"
                );
                false
            }
        }
    }

    /// Joins every submitted task, including tasks submitted while waiting.
    pub fn drain(&self) {
        loop {
            let pending: Vec<_> = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            if pending.is_empty() {
                return;
            }
            for task in pending {
                drop(task.join());
            }
        }
    }
}

/// Non-reentrant, non-blocking exclusive lock.
///
/// Callers that cannot acquire it immediately are dropped, not queued.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveGate {
    busy: Arc<AtomicBool>,
}

impl ExclusiveGate {
    /// Acquires the gate if it is free.
    #[must_use]
    pub fn try_acquire(&self) -> Option<GateGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Reports whether a sequence holds the gate.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the gate when dropped.
#[derive(Debug)]
pub struct GateGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
