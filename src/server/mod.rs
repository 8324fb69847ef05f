//! HTTP relay server
//!
//! Exposes the broadcast core over HTTP and serves the local playlist.

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::RelayServer;
