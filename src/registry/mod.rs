//! Source registry
//!
//! The registry maps each source key to the one broadcaster serving it and
//! guarantees that a key never has two producers running at once.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SourceRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ sources: RwLock<HashMap<Key, │
//!                  │   Mutex<Slot {               │
//!                  │     current: Broadcaster,    │
//!                  │   }>                         │
//!                  │ >                            │
//!                  └───────┬──────────────┬───────┘
//!                          │              │
//!          subscribe(key) ─┘              └─ reap() every reap_interval
//!          lock slot, launch if not live,    drop Terminated entries
//!          attach
//! ```
//!
//! Entries leave the map only through the reaper. Request paths may replace a
//! draining broadcaster with a fresh one, but never remove an entry.

pub mod config;
pub mod error;
pub mod key;
pub mod store;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use key::SourceKey;
pub use store::SourceRegistry;
