//! Server configuration
//!
//! [`ServerConfig`] is built in code with builder methods, or loaded from a
//! YAML file:
//!
//! ```yaml
//! local_m3u_path: playlist_local.m3u
//! server:
//!   host: 0.0.0.0
//!   port: 3037
//! ffmpeg_profile: hevc_nvenc   # blank or absent: detect from hardware
//! ffmpeg_path: ffmpeg
//! stream:
//!   inbox_capacity: 512
//!   read_chunk_size: 1024
//!   subscriber_timeout_secs: 5
//!   reap_interval_secs: 30
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::process::command::DEFAULT_FFMPEG;
use crate::registry::RegistryConfig;

/// Default port the relay listens on
pub const DEFAULT_PORT: u16 = 3037;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Local M3U playlist served at `/playlist.m3u`
    pub playlist_path: PathBuf,

    /// Transcoder binary
    pub ffmpeg_path: String,

    /// ffmpeg profile name (None = detect from hardware)
    pub ffmpeg_profile: Option<String>,

    /// Fan-out and reaper settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            playlist_path: PathBuf::from(crate::playlist::DEFAULT_INPUT),
            ffmpeg_path: DEFAULT_FFMPEG.to_string(),
            ffmpeg_profile: None,
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the playlist path
    pub fn playlist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.playlist_path = path.into();
        self
    }

    /// Set the ffmpeg profile
    pub fn ffmpeg_profile(mut self, profile: impl Into<String>) -> Self {
        self.ffmpeg_profile = Some(profile.into());
        self
    }

    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Load configuration from a YAML file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let file: FileConfig = serde_yaml::from_str(yaml)?;
        file.into_config()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    local_m3u_path: Option<PathBuf>,
    server: ServerSection,
    ffmpeg_profile: Option<String>,
    ffmpeg_path: Option<String>,
    stream: StreamSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerSection {
    host: String,
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamSection {
    inbox_capacity: Option<usize>,
    read_chunk_size: Option<usize>,
    subscriber_timeout_secs: Option<u64>,
    reap_interval_secs: Option<u64>,
}

impl FileConfig {
    fn into_config(self) -> Result<ServerConfig> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| Error::Config(format!("invalid server host: {}", self.server.host)))?;

        let mut config = ServerConfig::with_addr(SocketAddr::new(host, self.server.port));

        if let Some(path) = self.local_m3u_path {
            config.playlist_path = path;
        }
        if let Some(path) = self.ffmpeg_path {
            config.ffmpeg_path = path;
        }
        config.ffmpeg_profile = self
            .ffmpeg_profile
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let stream = self.stream;
        let mut registry = RegistryConfig::default();
        if let Some(capacity) = stream.inbox_capacity {
            registry = registry.inbox_capacity(capacity);
        }
        if let Some(size) = stream.read_chunk_size {
            registry = registry.read_chunk_size(size);
        }
        if let Some(secs) = stream.subscriber_timeout_secs {
            let timeout = non_zero_secs("subscriber_timeout_secs", secs)?;
            registry = registry.subscriber_timeout(timeout);
        }
        if let Some(secs) = stream.reap_interval_secs {
            let interval = non_zero_secs("reap_interval_secs", secs)?;
            registry = registry.reap_interval(interval);
        }
        config.registry = registry;

        Ok(config)
    }
}

fn non_zero_secs(field: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(Error::Config(format!("stream.{} must be greater than zero", field)));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 3037);
        assert_eq!(config.playlist_path, PathBuf::from("playlist_local.m3u"));
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert!(config.ffmpeg_profile.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .playlist_path("/srv/list.m3u")
            .ffmpeg_profile("h264_nvenc")
            .registry(RegistryConfig::default().inbox_capacity(16));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.playlist_path, PathBuf::from("/srv/list.m3u"));
        assert_eq!(config.ffmpeg_profile.as_deref(), Some("h264_nvenc"));
        assert_eq!(config.registry.inbox_capacity, 16);
    }

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
local_m3u_path: /data/channels.m3u
server:
  host: 127.0.0.1
  port: 9000
ffmpeg_profile: software_libx264
ffmpeg_path: /opt/ffmpeg/bin/ffmpeg
stream:
  inbox_capacity: 64
  subscriber_timeout_secs: 10
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.playlist_path, PathBuf::from("/data/channels.m3u"));
        assert_eq!(config.ffmpeg_profile.as_deref(), Some("software_libx264"));
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.registry.inbox_capacity, 64);
        assert_eq!(config.registry.subscriber_timeout, Duration::from_secs(10));
        assert_eq!(config.registry.read_chunk_size, 1024);
    }

    #[test]
    fn test_from_yaml_partial_uses_defaults() {
        let config = ServerConfig::from_yaml("server:\n  port: 4000\n").unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:4000".parse().unwrap());
        assert_eq!(config.playlist_path, PathBuf::from("playlist_local.m3u"));
    }

    #[test]
    fn test_blank_profile_means_detect() {
        let config = ServerConfig::from_yaml("ffmpeg_profile: \"  \"\n").unwrap();
        assert!(config.ffmpeg_profile.is_none());
    }

    #[test]
    fn test_invalid_host() {
        let result = ServerConfig::from_yaml("server:\n  host: not-an-ip\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_reap_interval_rejected() {
        let result = ServerConfig::from_yaml("stream:\n  reap_interval_secs: 0\n");
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("reap_interval_secs")));
    }

    #[test]
    fn test_zero_subscriber_timeout_rejected() {
        let result = ServerConfig::from_yaml("stream:\n  subscriber_timeout_secs: 0\n");
        assert!(
            matches!(result, Err(Error::Config(msg)) if msg.contains("subscriber_timeout_secs"))
        );
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ServerConfig::from_yaml("server: [1, 2");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(dir.path().join("config.yml")).unwrap();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "server:\n  port: 5000\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr.port(), 5000);
    }
}
