//! Registry error types
//!
//! Error types for acquiring and attaching to sources.

use thiserror::Error;

use super::key::SourceKey;

/// Error type for registry operations
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The producer process could not be launched
    #[error("Source unavailable: {key}: {reason}")]
    SourceUnavailable { key: SourceKey, reason: String },

    /// The broadcaster is shutting down and admits no new subscribers
    #[error("Source is draining: {0}")]
    SourceDraining(SourceKey),
}

impl RegistryError {
    /// Build a `SourceUnavailable` error from any displayable cause
    pub fn unavailable(key: &SourceKey, reason: impl std::fmt::Display) -> Self {
        RegistryError::SourceUnavailable {
            key: key.clone(),
            reason: reason.to_string(),
        }
    }
}
