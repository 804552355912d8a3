//! Generic per-key delayed-release scheduler.
//!
//! A [`ProbationManager`] holds keys for a fixed window and invokes a release
//! callback when the window elapses. The control loop uses it to suppress
//! repeated actions on the same object; anything needing "ignore repeats for
//! a while" semantics can reuse it.
//!
//! Expiry is best-effort: a key may be released slightly late (the background
//! sweep runs on an interval), but never early.

pub mod error;

pub use error::{ProbationError, Result};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const SWEEP_MIN: Duration = Duration::from_millis(10);
const SWEEP_MAX: Duration = Duration::from_secs(1);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Entry<T> {
    payload: T,
    expires_at: Instant,
}

struct Worker {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// Keyed delayed-release scheduler. `T` is an opaque payload stored with each
/// key and handed to the release callback.
pub struct ProbationManager<T> {
    name: String,
    window: Duration,
    entries: Arc<Mutex<HashMap<String, Entry<T>>>>,
    on_release: Arc<dyn Fn(&str, T) + Send + Sync>,
    worker: Mutex<Worker>,
}

impl<T: Send + 'static> ProbationManager<T> {
    pub fn new(
        name: &str,
        window: Duration,
        on_release: impl Fn(&str, T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
            on_release: Arc::new(on_release),
            worker: Mutex::new(Worker {
                handle: None,
                shutdown: None,
            }),
        }
    }

    /// Spawn the background expiry task. Calling `start` on an already
    /// started manager is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.handle.is_some() {
            tracing::debug!(manager = %self.name, "probation manager already started");
            return Ok(());
        }

        let (tx, mut rx) = watch::channel(false);
        let entries = Arc::clone(&self.entries);
        let on_release = Arc::clone(&self.on_release);
        let name = self.name.clone();
        let sweep = self.window.div_f64(4.0).clamp(SWEEP_MIN, SWEEP_MAX);

        let handle = tokio::spawn(async move {
            tracing::debug!(manager = %name, sweep_ms = sweep.as_millis() as u64, "probation expiry task started");
            let mut tick = tokio::time::interval(sweep);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let due = {
                            let mut entries = entries
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner());
                            let now = Instant::now();
                            let keys: Vec<String> = entries
                                .iter()
                                .filter(|(_, e)| e.expires_at <= now)
                                .map(|(k, _)| k.clone())
                                .collect();
                            keys.into_iter()
                                .filter_map(|k| entries.remove(&k).map(|e| (k, e.payload)))
                                .collect::<Vec<_>>()
                        };
                        // Callbacks run outside the entries lock.
                        for (key, payload) in due {
                            tracing::debug!(manager = %name, key = %key, "probation window elapsed");
                            on_release(&key, payload);
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::debug!(manager = %name, "probation expiry task stopped");
        });

        worker.handle = Some(handle);
        worker.shutdown = Some(tx);
        Ok(())
    }

    /// Signal the expiry task and wait (bounded) for it to exit. Idempotent.
    pub async fn stop(&self) {
        let (handle, shutdown) = {
            let mut worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            (worker.handle.take(), worker.shutdown.take())
        };

        let Some(handle) = handle else { return };
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        let abort = handle.abort_handle();
        if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
            tracing::warn!(manager = %self.name, "probation expiry task did not stop in time, aborting");
            abort.abort();
        }
    }

    /// Place `key` in probation until `now + window`.
    ///
    /// When the key is already present and `replace_if_present` is false the
    /// existing entry keeps its timer and
    /// [`ProbationError::AlreadyInProbation`] is returned; when true, the
    /// entry and its timer are refreshed.
    pub fn add(&self, key: &str, payload: T, replace_if_present: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !replace_if_present && entries.contains_key(key) {
            return Err(ProbationError::AlreadyInProbation(key.to_string()));
        }
        entries.insert(
            key.to_string(),
            Entry {
                payload,
                expires_at: Instant::now() + self.window,
            },
        );
        Ok(())
    }

    /// Whether `key` is currently in probation.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
