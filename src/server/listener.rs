//! Relay server
//!
//! Binds the HTTP listener, runs the reaper alongside it and shuts every
//! source down when the server stops.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::process::{CommandBuilder, CommandLauncher, Launcher};
use crate::registry::SourceRegistry;
use crate::server::config::ServerConfig;
use crate::server::routes::{build_router, AppState};

/// HTTP relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SourceRegistry>,
}

impl RelayServer {
    /// Create a server that launches ffmpeg for each source
    ///
    /// Fails if the configured ffmpeg profile does not exist.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let builder =
            CommandBuilder::from_config(config.ffmpeg_path.clone(), config.ffmpeg_profile.as_deref())?;

        tracing::info!(
            program = builder.program(),
            profile = config.ffmpeg_profile.as_deref().unwrap_or("auto"),
            "Transcoder configured"
        );

        Ok(Self::with_launcher(config, Arc::new(CommandLauncher::new(builder))))
    }

    /// Create a server with a custom producer launcher
    pub fn with_launcher(config: ServerConfig, launcher: Arc<dyn Launcher>) -> Self {
        let registry = Arc::new(SourceRegistry::with_config(
            launcher,
            config.registry.clone(),
        ));

        Self { config, registry }
    }

    /// Get a reference to the source registry
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server until the process is killed
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %listener.local_addr()?, "Relay server listening");

        let reaper_handle = self.registry.spawn_reaper_task();

        let app = build_router(AppState {
            registry: Arc::clone(&self.registry),
            playlist_path: Arc::new(self.config.playlist_path.clone()),
        });

        // Live responses never finish on their own, so graceful shutdown has to
        // end every stream before it can complete.
        let registry = Arc::clone(&self.registry);
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            registry.shutdown_all().await;
        };

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await;

        reaper_handle.abort();

        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::process::testing::FakeLauncher;
    use crate::registry::SourceKey;

    #[test]
    fn test_unknown_profile_rejected() {
        let config = ServerConfig::default().ffmpeg_profile("nope");
        assert!(RelayServer::new(config).is_err());
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let launcher = FakeLauncher::new();
        let server = Arc::new(RelayServer::with_launcher(
            ServerConfig::default(),
            launcher.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .serve(listener, async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /stream?url=A HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();

        let mut buf = vec![0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        let head = String::from_utf8_lossy(&buf[..n]);
        assert!(head.starts_with("HTTP/1.1 200"), "unexpected response: {}", head);

        let broadcaster = server.registry().get(&SourceKey::new("A")).await.unwrap();
        assert_eq!(broadcaster.subscriber_count(), 1);

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();

        assert!(launcher.killed(0));
    }
}
