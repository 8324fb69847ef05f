//! Source identifiers
//!
//! A source is identified by its upstream URL. The key is treated opaquely by
//! the registry: two requests share a producer only if their keys are equal.

use std::borrow::Borrow;

/// Unique identifier for a live source (canonically the upstream URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(String);

impl SourceKey {
    /// Create a new source key
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The upstream URL this key stands for
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceKey {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for SourceKey {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl Borrow<str> for SourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_display_is_url() {
        let key = SourceKey::new("http://example.com/live/1.ts");
        assert_eq!(key.to_string(), "http://example.com/live/1.ts");
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(SourceKey::from("http://a"), 1);

        assert_eq!(map.get("http://a"), Some(&1));
        assert_eq!(map.get("http://b"), None);
    }
}
