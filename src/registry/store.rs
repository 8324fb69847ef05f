//! Source registry implementation
//!
//! The central registry mapping each source key to its live broadcaster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::key::SourceKey;
use crate::broadcaster::{Broadcaster, Subscriber};
use crate::process::Launcher;
use crate::stats::SourceStats;

/// Times `subscribe` relaunches a producer that drained before it could attach
const MAX_ATTACH_ATTEMPTS: usize = 3;

/// Per-key section of the registry
///
/// Producers are launched only while this slot's lock is held, which is what
/// keeps a key down to a single producer.
#[derive(Default)]
struct Slot {
    current: Option<Arc<Broadcaster>>,
    /// Set by the reaper when the slot leaves the map
    retired: bool,
}

/// Central registry for all active sources
///
/// The map lock is held only to look up, insert or remove slots. Launching a
/// producer happens under the per-key slot lock, so requests for different
/// sources never wait on each other.
pub struct SourceRegistry {
    /// Map of source key to its slot
    sources: RwLock<HashMap<SourceKey, Arc<Mutex<Slot>>>>,

    /// Starts producers
    launcher: Arc<dyn Launcher>,

    /// Configuration
    config: RegistryConfig,

    /// Set once `shutdown_all` starts; no launches after that
    closed: AtomicBool,
}

impl SourceRegistry {
    /// Create a new registry with default configuration
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self::with_config(launcher, RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(launcher: Arc<dyn Launcher>, config: RegistryConfig) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            launcher,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the live broadcaster for `key`, launching one if needed
    ///
    /// A broadcaster that is draining or terminated is replaced by a fresh
    /// one. If the launch fails, nothing is stored and a later call retries.
    /// After `shutdown_all` every call fails with `SourceUnavailable`.
    pub async fn acquire(&self, key: &SourceKey) -> Result<Arc<Broadcaster>, RegistryError> {
        loop {
            let slot = self.slot(key).await;
            let mut slot = slot.lock().await;
            if slot.retired {
                continue;
            }

            return self.live_or_launch(key, &mut slot);
        }
    }

    /// Acquire the broadcaster for `key` and attach a new subscriber to it
    ///
    /// This is the entry point for viewer requests.
    pub async fn subscribe(&self, key: &SourceKey) -> Result<Subscriber, RegistryError> {
        let mut attempts = 0;

        loop {
            let slot = self.slot(key).await;
            let mut slot = slot.lock().await;
            if slot.retired {
                continue;
            }

            let broadcaster = self.live_or_launch(key, &mut slot)?;
            match broadcaster.attach() {
                Ok(subscriber) => return Ok(subscriber),
                Err(RegistryError::SourceDraining(_)) => {
                    // The producer exited between launch and attach
                    attempts += 1;
                    if attempts >= MAX_ATTACH_ATTEMPTS {
                        return Err(RegistryError::unavailable(
                            key,
                            "producer exited before a viewer could attach",
                        ));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get the broadcaster currently stored for `key`, in any state
    pub async fn get(&self, key: &SourceKey) -> Option<Arc<Broadcaster>> {
        let slot = self.sources.read().await.get(key).cloned()?;
        let slot = slot.lock().await;
        slot.current.clone()
    }

    /// Get total number of registry entries
    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }

    /// Statistics for every stored broadcaster
    pub async fn stats(&self) -> Vec<SourceStats> {
        let mut stats = Vec::new();
        for broadcaster in self.broadcasters().await {
            stats.push(broadcaster.stats());
        }
        stats
    }

    /// Whether `shutdown_all` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop every broadcaster and refuse further launches
    ///
    /// Entries stay in the map until the reaper sees them terminated.
    pub async fn shutdown_all(&self) {
        // Set before the snapshot: a launch either lands in a slot the
        // snapshot then locks, or sees the flag under that lock.
        self.closed.store(true, Ordering::SeqCst);

        let broadcasters = self.broadcasters().await;
        tracing::info!(count = broadcasters.len(), "Shutting down all sources");

        for broadcaster in &broadcasters {
            broadcaster.shutdown();
        }
        for broadcaster in &broadcasters {
            broadcaster.wait_terminated().await;
        }
    }

    /// Run one reaper sweep
    ///
    /// Removes entries whose broadcaster has terminated (or that hold none),
    /// and shuts down broadcasters nobody ever attached to. Slots locked by an
    /// in-flight `acquire` are skipped. Returns the number of entries removed.
    pub async fn reap(&self) -> usize {
        let mut sources = self.sources.write().await;
        let before = sources.len();

        sources.retain(|key, slot| {
            let Ok(mut slot) = slot.try_lock() else {
                return true;
            };

            if let Some(broadcaster) = &slot.current {
                if broadcaster.is_orphaned() {
                    tracing::warn!(
                        source = %key,
                        broadcaster = broadcaster.id(),
                        "Shutting down broadcaster with no subscribers"
                    );
                    broadcaster.reclaim_orphan();
                }

                if !broadcaster.state().is_terminated() {
                    return true;
                }
            }

            slot.retired = true;
            tracing::info!(source = %key, "Source removed by reaper");
            false
        });

        before - sources.len()
    }

    /// Spawn background reaper task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_reaper_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.reap().await;
                if removed > 0 {
                    tracing::debug!(removed = removed, "Reaper sweep finished");
                }

                for stats in registry.stats().await {
                    tracing::debug!(
                        source = %stats.key,
                        broadcaster = stats.broadcaster_id,
                        state = %stats.state,
                        subscribers = stats.subscriber_count,
                        bitrate = stats.bitrate(),
                        chunks_dropped = stats.chunks_dropped,
                        "Source stats"
                    );
                }
            }
        })
    }

    async fn slot(&self, key: &SourceKey) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.sources.read().await.get(key) {
            return Arc::clone(slot);
        }

        let mut sources = self.sources.write().await;
        Arc::clone(sources.entry(key.clone()).or_default())
    }

    async fn broadcasters(&self) -> Vec<Arc<Broadcaster>> {
        let slots: Vec<_> = self.sources.read().await.values().cloned().collect();

        let mut broadcasters = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(broadcaster) = slot.lock().await.current.clone() {
                broadcasters.push(broadcaster);
            }
        }
        broadcasters
    }

    /// Caller must hold the slot lock
    fn live_or_launch(
        &self,
        key: &SourceKey,
        slot: &mut Slot,
    ) -> Result<Arc<Broadcaster>, RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::unavailable(key, "relay is shutting down"));
        }

        if let Some(broadcaster) = &slot.current {
            if broadcaster.is_live() {
                return Ok(Arc::clone(broadcaster));
            }
        }

        let producer = self.launcher.launch(key).inspect_err(|e| {
            tracing::warn!(source = %key, error = %e, "Failed to launch producer");
        })?;

        let broadcaster = Broadcaster::start(key.clone(), producer, self.config.clone());
        slot.current = Some(Arc::clone(&broadcaster));

        Ok(broadcaster)
    }
}
