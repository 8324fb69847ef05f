//! Per-source broadcaster
//!
//! A broadcaster owns one producer process and fans its output out to every
//! attached subscriber.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<Broadcaster>
//!               ┌──────────────────────────────┐
//!  producer ──► │ pump task                    │
//!  stdout       │   read chunk ─► fan_out()    │
//!               │ inner: Mutex<{               │
//!               │   subscribers: id ─► mpsc::Tx│
//!               │ }>                           │
//!               └──────┬───────────┬───────────┘
//!                      │ try_send  │ try_send
//!                      ▼           ▼
//!                [Subscriber]  [Subscriber]
//!                 next()        next()
//! ```
//!
//! # Lossy Broadcast
//!
//! Chunks are offered with `try_send`. A full inbox drops the chunk for that
//! subscriber only, so one stalled viewer can never block the producer or the
//! other viewers. Chunks are `bytes::Bytes`, so every subscriber shares the
//! same allocation.

mod pump;
pub mod state;
pub mod subscriber;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::process::Producer;
use crate::registry::{RegistryConfig, RegistryError, SourceKey};
use crate::stats::{PumpCounters, SourceStats};

pub use state::{BroadcasterState, DrainReason};
pub use subscriber::{Delivery, EndReason, Subscriber};

static NEXT_BROADCASTER_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    /// Fan-out set; its length is the subscriber count
    subscribers: HashMap<u64, mpsc::Sender<Bytes>>,
    next_subscriber_id: u64,
    drain_reason: Option<DrainReason>,
}

/// Owns one producer and distributes its output
pub struct Broadcaster {
    id: u64,
    key: SourceKey,
    config: RegistryConfig,
    inner: Mutex<Inner>,
    /// Written only while `inner` is locked
    state: watch::Sender<BroadcasterState>,
    cancel: CancellationToken,
    counters: PumpCounters,
    created_at: Instant,
}

impl Broadcaster {
    /// Create a broadcaster for a freshly launched producer and start its pump
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(key: SourceKey, producer: Box<dyn Producer>, config: RegistryConfig) -> Arc<Self> {
        let (state, _) = watch::channel(BroadcasterState::Starting);

        let broadcaster = Arc::new(Self {
            id: NEXT_BROADCASTER_ID.fetch_add(1, Ordering::Relaxed),
            key,
            config,
            inner: Mutex::new(Inner {
                subscribers: HashMap::new(),
                next_subscriber_id: 1,
                drain_reason: None,
            }),
            state,
            cancel: CancellationToken::new(),
            counters: PumpCounters::new(),
            created_at: Instant::now(),
        });

        tracing::info!(
            source = %broadcaster.key,
            broadcaster = broadcaster.id,
            pid = ?producer.pid(),
            "Broadcaster started"
        );

        tokio::spawn(pump::run(Arc::clone(&broadcaster), producer));

        broadcaster
    }

    /// Unique ID of this broadcaster instance
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Current lifecycle state
    pub fn state(&self) -> BroadcasterState {
        *self.state.borrow()
    }

    /// Whether new subscribers may attach
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Attach a new subscriber
    ///
    /// The first attach moves the broadcaster from `Starting` to `Running`.
    /// Fails with `SourceDraining` once shutdown has begun.
    pub fn attach(self: &Arc<Self>) -> Result<Subscriber, RegistryError> {
        let mut inner = self.inner.lock();

        match self.state() {
            BroadcasterState::Starting => {
                self.state.send_replace(BroadcasterState::Running);
            }
            BroadcasterState::Running => {}
            BroadcasterState::Draining | BroadcasterState::Terminated => {
                return Err(RegistryError::SourceDraining(self.key.clone()));
            }
        }

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;

        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        inner.subscribers.insert(id, tx);
        let subscribers = inner.subscribers.len();
        drop(inner);

        tracing::info!(
            source = %self.key,
            broadcaster = self.id,
            subscriber = id,
            subscribers = subscribers,
            "Subscriber attached"
        );

        Ok(Subscriber::new(
            id,
            self.key.clone(),
            rx,
            Arc::downgrade(self),
            self.config.subscriber_timeout,
        ))
    }

    /// Remove a subscriber from the fan-out set
    ///
    /// Detaching the last subscriber starts draining. Unknown IDs are ignored,
    /// so a subscriber can never be counted out twice.
    pub fn detach(&self, subscriber_id: u64) {
        let mut inner = self.inner.lock();
        if inner.subscribers.remove(&subscriber_id).is_none() {
            return;
        }

        let remaining = inner.subscribers.len();
        tracing::debug!(
            source = %self.key,
            broadcaster = self.id,
            subscriber = subscriber_id,
            subscribers = remaining,
            "Subscriber detached"
        );

        if remaining == 0 {
            self.drain_locked(&mut inner, DrainReason::Idle);
        }
    }

    /// Stop the broadcaster regardless of subscribers
    pub fn shutdown(&self) {
        self.begin_drain(DrainReason::Shutdown);
    }

    /// Stop a broadcaster nobody attached to within `orphan_timeout`
    pub(crate) fn reclaim_orphan(&self) {
        self.begin_drain(DrainReason::Orphaned);
    }

    /// Why draining started, once it has
    pub fn drain_reason(&self) -> Option<DrainReason> {
        self.inner.lock().drain_reason
    }

    /// Wait until the producer has been killed and reaped
    pub async fn wait_terminated(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|s| s.is_terminated()).await;
    }

    /// Whether this broadcaster was never attached to within `orphan_timeout`
    pub fn is_orphaned(&self) -> bool {
        self.state() == BroadcasterState::Starting
            && self.created_at.elapsed() >= self.config.orphan_timeout
    }

    /// Snapshot of this broadcaster's statistics
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            key: self.key.clone(),
            broadcaster_id: self.id,
            state: self.state(),
            subscriber_count: self.subscriber_count(),
            bytes_read: self.counters.bytes_read(),
            chunks_read: self.counters.chunks_read(),
            chunks_delivered: self.counters.chunks_delivered(),
            chunks_dropped: self.counters.chunks_dropped(),
            uptime: self.counters.uptime(),
        }
    }

    /// Offer a chunk to every attached subscriber without waiting
    fn fan_out(&self, chunk: Bytes) {
        let mut inner = self.inner.lock();
        let mut delivered = 0;
        let mut dropped = 0;

        inner.subscribers.retain(|_, tx| match tx.try_send(chunk.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        self.counters.record_fan_out(delivered, dropped);

        if inner.subscribers.is_empty() && self.state() == BroadcasterState::Running {
            self.drain_locked(&mut inner, DrainReason::Idle);
        }
    }

    fn begin_drain(&self, reason: DrainReason) {
        let mut inner = self.inner.lock();
        self.drain_locked(&mut inner, reason);
    }

    /// Enter `Draining` if still live
    fn drain_locked(&self, inner: &mut Inner, reason: DrainReason) {
        if !self.state().is_live() {
            return;
        }

        self.state.send_replace(BroadcasterState::Draining);
        inner.drain_reason = Some(reason);
        // Closing every inbox ends each subscriber after its buffered chunks.
        let subscribers = inner.subscribers.len();
        inner.subscribers.clear();
        self.cancel.cancel();

        tracing::info!(
            source = %self.key,
            broadcaster = self.id,
            reason = %reason,
            subscribers = subscribers,
            "Broadcaster draining"
        );
    }

    fn mark_terminated(&self) {
        let _inner = self.inner.lock();
        self.state.send_replace(BroadcasterState::Terminated);
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}
