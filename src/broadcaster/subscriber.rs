//! Per-viewer subscription
//!
//! A [`Subscriber`] owns a bounded inbox filled by its broadcaster's output
//! pump. The viewer pulls with [`Subscriber::next`], which never waits longer
//! than the configured stall timeout. The subscriber detaches from its
//! broadcaster exactly once: on the first end-of-stream or when dropped.

use std::sync::Weak;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use super::Broadcaster;
use crate::registry::SourceKey;

/// Why a subscriber's stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No chunk arrived within the stall timeout
    Stalled,
    /// The broadcaster stopped delivering (producer exit or source shutdown)
    ProducerExited,
}

/// Result of pulling from a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Chunk(Bytes),
    EndOfStream(EndReason),
}

/// Handle through which one viewer consumes a broadcaster's output
pub struct Subscriber {
    id: u64,
    key: SourceKey,
    inbox: mpsc::Receiver<Bytes>,
    owner: Weak<Broadcaster>,
    timeout: Duration,
    ended: Option<EndReason>,
    detached: bool,
}

impl Subscriber {
    pub(super) fn new(
        id: u64,
        key: SourceKey,
        inbox: mpsc::Receiver<Bytes>,
        owner: Weak<Broadcaster>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            key,
            inbox,
            owner,
            timeout,
            ended: None,
            detached: false,
        }
    }

    /// Subscriber ID, unique within its broadcaster
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Source this subscriber is attached to
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Whether this subscriber has already detached
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Wait for the next chunk
    ///
    /// Returns `EndOfStream(Stalled)` if nothing arrives within the timeout and
    /// `EndOfStream(ProducerExited)` once the broadcaster has drained. Once
    /// ended, every further call returns the same end-of-stream immediately.
    pub async fn next(&mut self) -> Delivery {
        if let Some(reason) = self.ended {
            return Delivery::EndOfStream(reason);
        }

        let reason = match tokio::time::timeout(self.timeout, self.inbox.recv()).await {
            Ok(Some(chunk)) => return Delivery::Chunk(chunk),
            Ok(None) => EndReason::ProducerExited,
            Err(_) => EndReason::Stalled,
        };

        tracing::debug!(
            source = %self.key,
            subscriber = self.id,
            reason = ?reason,
            "Subscriber reached end of stream"
        );

        self.ended = Some(reason);
        self.detach();
        Delivery::EndOfStream(reason)
    }

    /// Convert into a byte stream suitable for an HTTP response body
    ///
    /// The stream ends at the first end-of-stream; dropping it detaches.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut subscriber| async move {
            match subscriber.next().await {
                Delivery::Chunk(chunk) => Some((Ok(chunk), subscriber)),
                Delivery::EndOfStream(_) => None,
            }
        })
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;

        if let Some(owner) = self.owner.upgrade() {
            owner.detach(self.id);
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("ended", &self.ended)
            .field("detached", &self.detached)
            .finish()
    }
}
