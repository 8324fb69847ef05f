//! Registry configuration
//!
//! Tunables for the per-source fan-out and the background reaper.

use std::time::Duration;

/// Smallest accepted stall timeout and reaper interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the source registry and the broadcasters it creates
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each subscriber's inbox, in chunks
    pub inbox_capacity: usize,

    /// Maximum bytes read from the producer per chunk
    pub read_chunk_size: usize,

    /// How long a subscriber waits for a chunk before treating the stream as stalled
    pub subscriber_timeout: Duration,

    /// Interval between reaper sweeps
    pub reap_interval: Duration,

    /// How long a broadcaster may sit in `Starting` without any subscriber
    pub orphan_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 512,
            read_chunk_size: 1024,
            subscriber_timeout: Duration::from_secs(5),
            reap_interval: Duration::from_secs(30),
            orphan_timeout: Duration::from_secs(30),
        }
    }
}

impl RegistryConfig {
    /// Set the inbox capacity (minimum 1)
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Set the producer read size (minimum 1)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the subscriber stall timeout (minimum 1ms)
    pub fn subscriber_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_timeout = timeout.max(MIN_INTERVAL);
        self
    }

    /// Set the reaper interval (minimum 1ms)
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the orphan timeout
    pub fn orphan_timeout(mut self, timeout: Duration) -> Self {
        self.orphan_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.inbox_capacity, 512);
        assert_eq!(config.read_chunk_size, 1024);
        assert_eq!(config.subscriber_timeout, Duration::from_secs(5));
        assert_eq!(config.reap_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_floors_values() {
        let config = RegistryConfig::default()
            .inbox_capacity(0)
            .read_chunk_size(0)
            .subscriber_timeout(Duration::ZERO)
            .reap_interval(Duration::ZERO);

        assert_eq!(config.inbox_capacity, 1);
        assert_eq!(config.read_chunk_size, 1);
        assert_eq!(config.subscriber_timeout, MIN_INTERVAL);
        assert_eq!(config.reap_interval, MIN_INTERVAL);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .inbox_capacity(8)
            .subscriber_timeout(Duration::from_millis(200))
            .reap_interval(Duration::from_secs(1))
            .orphan_timeout(Duration::from_secs(2));

        assert_eq!(config.inbox_capacity, 8);
        assert_eq!(config.subscriber_timeout, Duration::from_millis(200));
        assert_eq!(config.reap_interval, Duration::from_secs(1));
        assert_eq!(config.orphan_timeout, Duration::from_secs(2));
    }
}
