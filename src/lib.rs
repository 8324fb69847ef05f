//! ts-relay: one transcode per live source, any number of HTTP viewers
//!
//! This library provides:
//! - A source registry that runs at most one producer process per upstream URL
//! - Lossy fan-out of the producer's output to independent, bounded subscriber inboxes
//! - Immediate idle shutdown when the last viewer leaves, and a background reaper
//! - ffmpeg command profiles with hardware-encoder detection
//! - An axum HTTP server exposing `/stream?url=...` and `/playlist.m3u`
//!
//! # Example: Relay Server
//!
//! ```no_run
//! use ts_relay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::load("config.yml")?;
//!     let server = RelayServer::new(config)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Embedding the Registry
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ts_relay::broadcaster::Delivery;
//! use ts_relay::process::{CommandBuilder, CommandLauncher, Profile};
//! use ts_relay::registry::{SourceKey, SourceRegistry};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let launcher = CommandLauncher::new(CommandBuilder::new("ffmpeg", Profile::detect()));
//! let registry = Arc::new(SourceRegistry::new(Arc::new(launcher)));
//! let _reaper = registry.spawn_reaper_task();
//!
//! let mut viewer = registry.subscribe(&SourceKey::new("http://example.com/live.m3u8")).await?;
//! while let Delivery::Chunk(chunk) = viewer.next().await {
//!     println!("{} bytes", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod broadcaster;
pub mod error;
pub mod playlist;
pub mod process;
pub mod registry;
pub mod server;
pub mod stats;

// Re-export main types for convenience
pub use broadcaster::{Broadcaster, BroadcasterState, Delivery, EndReason, Subscriber};
pub use error::{Error, Result};
pub use registry::{RegistryConfig, RegistryError, SourceKey, SourceRegistry};
pub use server::{RelayServer, ServerConfig};
