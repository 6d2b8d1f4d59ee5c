//! Automatic recovery when the daemon runs but traffic does not flow.
//!
//! Before the daemon has bootstrapped, reloads are spaced out quadratically
//! (1, 4, 9, ... units). Once it is ready a single countdown reloads early
//! and requests a full restart if connectivity never came back, after which
//! the policy stays quiet until cancelled. A countdown that ends without a
//! restart leaves the policy free to arm again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::actions::{Action, ActionSender};
use crate::files::FileAccess;
use crate::network::NetworkReachability;
use crate::state::{LifecycleState, Phase};

const RECONNECT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reconnect");

/// Decides when accumulated unavailability warrants corrective action.
pub trait ReconnectionPolicy: Send + Sync {
    /// Connectivity was reported unavailable while the network is up.
    fn arm(&self);

    /// Connectivity recovered or the daemon is going away.
    fn cancel(&self);
}

impl<T> ReconnectionPolicy for Arc<T>
where
    T: ReconnectionPolicy + ?Sized,
{
    fn arm(&self) {
        (**self).arm();
    }

    fn cancel(&self) {
        (**self).cancel();
    }
}

/// Pacing of the progressive policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectSchedule {
    /// Base delay of the partial counter; attempt `n` waits `n²` of these.
    pub partial_unit: Duration,
    /// Interval between ticks of the full countdown.
    pub full_tick: Duration,
    /// Ticks in the full countdown.
    pub full_ticks: u32,
    /// Tick at which the countdown reloads the daemon.
    pub reload_tick: u32,
}

impl Default for ReconnectSchedule {
    fn default() -> Self {
        Self {
            partial_unit: Duration::from_secs(60),
            full_tick: Duration::from_secs(1),
            full_ticks: 60,
            reload_tick: 10,
        }
    }
}

#[derive(Debug, Default)]
struct Timer {
    generation: u64,
    pending: Option<Sender<()>>,
    locked: bool,
}

struct StaleCache {
    files: Arc<dyn FileAccess>,
    path: Utf8PathBuf,
}

struct Shared {
    state: Arc<LifecycleState>,
    network: Arc<dyn NetworkReachability>,
    actions: Arc<dyn ActionSender>,
    schedule: ReconnectSchedule,
    partial: AtomicU32,
    full: AtomicU32,
    timer: Mutex<Timer>,
    stale_cache: OnceLock<StaleCache>,
}

/// [`ReconnectionPolicy`] with a partial and a full counter.
#[derive(Clone)]
pub struct ProgressiveReconnector {
    shared: Arc<Shared>,
}

impl ProgressiveReconnector {
    /// Policy watching `state` and sending corrective actions.
    pub fn new(
        state: Arc<LifecycleState>,
        network: Arc<dyn NetworkReachability>,
        actions: Arc<dyn ActionSender>,
        schedule: ReconnectSchedule,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state,
                network,
                actions,
                schedule,
                partial: AtomicU32::new(0),
                full: AtomicU32::new(0),
                timer: Mutex::new(Timer::default()),
                stale_cache: OnceLock::new(),
            }),
        }
    }

    /// Deletes `path` before each recovery restart so the daemon fetches
    /// fresh directory information.
    #[must_use]
    pub fn clearing_before_restart(self, files: Arc<dyn FileAccess>, path: Utf8PathBuf) -> Self {
        // Only the first cache registered is honoured.
        let _ = self.shared.stale_cache.set(StaleCache { files, path });
        self
    }

    /// Reloads scheduled by the partial counter so far.
    #[must_use]
    pub fn partial_attempts(&self) -> u32 {
        self.shared.partial.load(Ordering::SeqCst)
    }

    /// Ticks elapsed in the current full countdown.
    #[must_use]
    pub fn full_ticks(&self) -> u32 {
        self.shared.full.load(Ordering::SeqCst)
    }

    /// True while a timer is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.shared.lock().pending.is_some()
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Timer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, generation: u64, lock: bool) {
        let mut timer = self.lock();
        if timer.generation == generation {
            timer.pending = None;
            timer.locked |= lock;
        }
    }

    fn reconnectable(&self) -> bool {
        self.state.is_ready() && self.network.is_network_available()
    }

    fn drop_stale_cache(&self) {
        if let Some(cache) = self.stale_cache.get() {
            if let Err(error) = cache.files.remove(&cache.path) {
                warn!(target: RECONNECT_TARGET, error = %error, "could not drop cached consensus");
            }
        }
    }

    fn run_partial(&self, generation: u64, delay: Duration, cancelled: &Receiver<()>) {
        if matches!(cancelled.recv_timeout(delay), Err(RecvTimeoutError::Timeout)) {
            if self.network.is_network_available() {
                info!(target: RECONNECT_TARGET, "partial reconnection: reloading daemon");
                self.actions.send(Action::Reload);
            } else {
                debug!(target: RECONNECT_TARGET, "network down; skipping reload");
            }
            self.finish(generation, false);
        }
    }

    fn run_full(&self, generation: u64, cancelled: &Receiver<()>) {
        for tick in 1..=self.schedule.full_ticks {
            if !matches!(
                cancelled.recv_timeout(self.schedule.full_tick),
                Err(RecvTimeoutError::Timeout)
            ) {
                return;
            }
            self.full.store(tick, Ordering::SeqCst);
            if tick == self.schedule.reload_tick && self.reconnectable() {
                info!(target: RECONNECT_TARGET, tick, "full reconnection: reloading daemon");
                self.actions.send(Action::Reload);
            }
        }
        let recoverable = self.state.phase() == Phase::Running && self.reconnectable();
        if recoverable {
            warn!(target: RECONNECT_TARGET, "connectivity never recovered; requesting restart");
            self.drop_stale_cache();
            self.actions.send(Action::Restart);
        } else {
            debug!(target: RECONNECT_TARGET, "countdown ended without restart; resetting counters");
            self.partial.store(0, Ordering::SeqCst);
            self.full.store(0, Ordering::SeqCst);
        }
        self.finish(generation, recoverable);
    }
}

impl ReconnectionPolicy for ProgressiveReconnector {
    fn arm(&self) {
        let mut timer = self.shared.lock();
        if timer.locked || timer.pending.is_some() {
            return;
        }
        let (sender, cancelled) = mpsc::channel();
        let generation = timer.generation;
        let shared = Arc::clone(&self.shared);
        let spawned = if self.shared.state.is_ready() {
            debug!(target: RECONNECT_TARGET, "arming full countdown");
            thread::Builder::new()
                .name("reconnect-full".into())
                .spawn(move || shared.run_full(generation, &cancelled))
        } else {
            let attempt = self.shared.partial.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            let delay = self
                .shared
                .schedule
                .partial_unit
                .saturating_mul(attempt.saturating_mul(attempt));
            debug!(target: RECONNECT_TARGET, attempt, ?delay, "arming partial reload");
            thread::Builder::new()
                .name("reconnect-partial".into())
                .spawn(move || shared.run_partial(generation, delay, &cancelled))
        };
        match spawned {
            Ok(_) => timer.pending = Some(sender),
            Err(error) => {
                warn!(target: RECONNECT_TARGET, error = %error, "could not arm reconnection timer");
            }
        }
    }

    fn cancel(&self) {
        let mut timer = self.shared.lock();
        timer.generation = timer.generation.wrapping_add(1);
        timer.pending = None;
        timer.locked = false;
        self.shared.partial.store(0, Ordering::SeqCst);
        self.shared.full.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ProgressiveReconnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveReconnector")
            .field("schedule", &self.shared.schedule)
            .field("partial", &self.partial_attempts())
            .field("full", &self.full_ticks())
            .finish_non_exhaustive()
    }
}
