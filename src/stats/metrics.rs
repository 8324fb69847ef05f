//! Statistics for broadcasters and the registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::broadcaster::BroadcasterState;
use crate::registry::SourceKey;

/// Live counters updated by a broadcaster's output pump
#[derive(Debug)]
pub struct PumpCounters {
    started_at: Instant,
    bytes_read: AtomicU64,
    chunks_read: AtomicU64,
    chunks_delivered: AtomicU64,
    chunks_dropped: AtomicU64,
}

impl PumpCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_read: AtomicU64::new(0),
            chunks_read: AtomicU64::new(0),
            chunks_delivered: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
        }
    }

    /// Record a chunk read from the producer
    pub fn record_read(&self, len: usize) {
        self.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
        self.chunks_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of offering one chunk to every subscriber
    pub fn record_fan_out(&self, delivered: u64, dropped: u64) {
        self.chunks_delivered.fetch_add(delivered, Ordering::Relaxed);
        self.chunks_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_read.load(Ordering::Relaxed)
    }

    pub fn chunks_delivered(&self) -> u64 {
        self.chunks_delivered.load(Ordering::Relaxed)
    }

    pub fn chunks_dropped(&self) -> u64 {
        self.chunks_dropped.load(Ordering::Relaxed)
    }

    /// Time since the producer was launched
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for PumpCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time statistics for one source
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Source key
    pub key: SourceKey,
    /// Broadcaster instance ID
    pub broadcaster_id: u64,
    /// Lifecycle state
    pub state: BroadcasterState,
    /// Attached subscribers
    pub subscriber_count: usize,
    /// Total bytes read from the producer
    pub bytes_read: u64,
    /// Chunks read from the producer
    pub chunks_read: u64,
    /// Chunk copies handed to subscriber inboxes
    pub chunks_delivered: u64,
    /// Chunk copies dropped because an inbox was full
    pub chunks_dropped: u64,
    /// Time since launch
    pub uptime: Duration,
}

impl SourceStats {
    /// Producer output rate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_read * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(bytes_read: u64, uptime: Duration) -> SourceStats {
        SourceStats {
            key: SourceKey::new("http://a"),
            broadcaster_id: 1,
            state: BroadcasterState::Running,
            subscriber_count: 1,
            bytes_read,
            chunks_read: 0,
            chunks_delivered: 0,
            chunks_dropped: 0,
            uptime,
        }
    }

    #[test]
    fn test_counters_start_at_zero() {
        let counters = PumpCounters::new();
        assert_eq!(counters.bytes_read(), 0);
        assert_eq!(counters.chunks_read(), 0);
        assert_eq!(counters.chunks_delivered(), 0);
        assert_eq!(counters.chunks_dropped(), 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let counters = PumpCounters::new();
        counters.record_read(188);
        counters.record_read(376);
        counters.record_fan_out(3, 1);
        counters.record_fan_out(2, 2);

        assert_eq!(counters.bytes_read(), 564);
        assert_eq!(counters.chunks_read(), 2);
        assert_eq!(counters.chunks_delivered(), 5);
        assert_eq!(counters.chunks_dropped(), 3);
    }

    #[test]
    fn test_bitrate() {
        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        let stats = snapshot(1_000_000, Duration::from_secs(10));
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_bitrate_zero_duration() {
        let stats = snapshot(1_000_000, Duration::ZERO);
        assert_eq!(stats.bitrate(), 0);
    }
}
