//! Owned handle over the execution unit running a supervised daemon.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::runner::ChildSlot;

#[derive(Debug, Default)]
struct Completion {
    finished: Mutex<bool>,
    changed: Condvar,
}

impl Completion {
    fn finish(&self) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.changed.notify_all();
    }

    fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self, timeout: Duration) -> bool {
        let finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        let (finished, _) = self
            .changed
            .wait_timeout_while(finished, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *finished
    }
}

/// Marks completion even when the routine panics.
struct FinishOnDrop(Arc<Completion>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// A named worker blocking on a daemon for the daemon's whole lifetime.
///
/// Liveness is the routine still running. [`interrupt`](Self::interrupt)
/// cancels the wait by killing the child recorded in the handle's
/// [`ChildSlot`].
#[derive(Debug)]
pub struct ExecutionHandle {
    name: String,
    slot: ChildSlot,
    completion: Arc<Completion>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionHandle {
    /// Spawns `routine` on a thread named `name`.
    pub fn spawn<F>(name: &str, routine: F) -> io::Result<Arc<Self>>
    where
        F: FnOnce(&ChildSlot) + Send + 'static,
    {
        let slot = ChildSlot::default();
        let completion = Arc::new(Completion::default());
        let worker_slot = slot.clone();
        let guard = FinishOnDrop(Arc::clone(&completion));
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _finish = guard;
                routine(&worker_slot);
            })?;
        Ok(Arc::new(Self {
            name: name.to_owned(),
            slot,
            completion,
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Logical name used for discovery.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the routine has not returned.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.completion.is_finished()
    }

    /// PID of the child currently being waited on.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.slot.pid()
    }

    /// Cancels the wait by killing the attached child.
    pub fn interrupt(&self) {
        self.slot.cancel();
    }

    /// Waits up to `timeout` for the routine to return; true if it did.
    #[must_use]
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        self.completion.wait(timeout)
    }

    /// Blocks until the routine returns and reaps the thread.
    pub fn join(&self) {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            drop(thread.join());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn handle_is_alive_until_routine_returns() {
        let (release, released) = mpsc::channel::<()>();
        let handle = ExecutionHandle::spawn("primary", move |_| {
            drop(released.recv());
        })
        .expect("spawn handle");
        assert!(handle.is_alive());
        assert_eq!(handle.name(), "primary");
        release.send(()).expect("release routine");
        assert!(handle.wait_finished(Duration::from_secs(5)));
        assert!(!handle.is_alive());
        handle.join();
    }

    #[test]
    fn panicking_routine_still_finishes() {
        let handle = ExecutionHandle::spawn("primary", |_| panic!("daemon routine exploded"))
            .expect("spawn handle");
        handle.join();
        assert!(!handle.is_alive());
    }

    #[test]
    fn interrupt_cancels_the_slot() {
        let handle = ExecutionHandle::spawn("primary", |slot| {
            while !slot.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .expect("spawn handle");
        handle.interrupt();
        assert!(handle.wait_finished(Duration::from_secs(5)));
    }

    #[test]
    fn wait_finished_times_out_for_live_routine() {
        let handle = ExecutionHandle::spawn("primary", |slot| {
            while !slot.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .expect("spawn handle");
        assert!(!handle.wait_finished(Duration::from_millis(20)));
        handle.interrupt();
        handle.join();
    }
}
