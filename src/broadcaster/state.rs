//! Broadcaster state machine
//!
//! Tracks a source from producer launch to termination.
//!
//! ```text
//! Starting ──attach──► Running ──last detach──► Draining ──process reaped──► Terminated
//!     │                   │                        ▲
//!     └───────────────────┴──producer EOF/error────┘
//! ```

/// Lifecycle state of a broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterState {
    /// Producer launched, no subscriber attached yet
    Starting,
    /// At least one subscriber attached, output pump active
    Running,
    /// Shutdown requested; no new subscribers admitted
    Draining,
    /// Producer killed and reaped
    Terminated,
}

impl BroadcasterState {
    /// Whether new subscribers may attach
    pub fn is_live(&self) -> bool {
        matches!(self, BroadcasterState::Starting | BroadcasterState::Running)
    }

    /// Whether this is the terminal state
    pub fn is_terminated(&self) -> bool {
        *self == BroadcasterState::Terminated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcasterState::Starting => "starting",
            BroadcasterState::Running => "running",
            BroadcasterState::Draining => "draining",
            BroadcasterState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for BroadcasterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a broadcaster started draining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// Last subscriber detached
    Idle,
    /// Producer output reached end-of-file
    ProducerExited,
    /// Reading the producer output failed
    ReadError,
    /// Never attached to within the orphan timeout
    Orphaned,
    /// Explicit shutdown
    Shutdown,
}

impl DrainReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainReason::Idle => "idle",
            DrainReason::ProducerExited => "producer exited",
            DrainReason::ReadError => "read error",
            DrainReason::Orphaned => "orphaned",
            DrainReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DrainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness() {
        assert!(BroadcasterState::Starting.is_live());
        assert!(BroadcasterState::Running.is_live());
        assert!(!BroadcasterState::Draining.is_live());
        assert!(!BroadcasterState::Terminated.is_live());
    }

    #[test]
    fn test_only_terminated_is_terminal() {
        assert!(BroadcasterState::Terminated.is_terminated());
        assert!(!BroadcasterState::Draining.is_terminated());
    }
}
