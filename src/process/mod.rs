//! Producer processes
//!
//! The broadcast core only needs two things from a producer: a readable
//! output stream and a way to kill it. [`Launcher`] turns a source key into
//! a running [`Producer`]; [`CommandLauncher`] does so by spawning ffmpeg.

pub mod command;

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::registry::{RegistryError, SourceKey};

pub use command::{CommandBuilder, Profile};

/// Readable output of a producer
pub type ProducerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A running producer process
#[async_trait]
pub trait Producer: Send {
    /// Take the output stream. Returns `None` once it has been taken.
    fn take_output(&mut self) -> Option<ProducerOutput>;

    /// Kill the process and wait for it to exit
    async fn terminate(&mut self) -> std::io::Result<()>;

    /// OS process ID, if any
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Starts producers for sources
pub trait Launcher: Send + Sync + 'static {
    /// Launch a producer for `key`
    ///
    /// Any failure is reported as `SourceUnavailable`.
    fn launch(&self, key: &SourceKey) -> Result<Box<dyn Producer>, RegistryError>;
}

/// Launches producers as child processes built by a [`CommandBuilder`]
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    builder: CommandBuilder,
}

impl CommandLauncher {
    pub fn new(builder: CommandBuilder) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, key: &SourceKey) -> Result<Box<dyn Producer>, RegistryError> {
        let args = self.builder.build(key.as_str());

        tracing::debug!(
            source = %key,
            program = self.builder.program(),
            args = ?args,
            "Spawning producer"
        );

        let child = Command::new(self.builder.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RegistryError::unavailable(key, e))?;

        Ok(Box::new(ChildProducer::new(child)))
    }
}

/// A [`Producer`] backed by a tokio child process
pub struct ChildProducer {
    child: Child,
}

impl ChildProducer {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl Producer for ChildProducer {
    fn take_output(&mut self) -> Option<ProducerOutput> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as ProducerOutput)
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        let pid = self.child.id();

        // Fails if the child already exited; wait() still reaps it.
        if let Err(e) = self.child.start_kill() {
            tracing::trace!(error = %e, "Producer already exited");
        }

        let status = self.child.wait().await?;
        tracing::debug!(pid = ?pid, status = %status, "Producer exited");
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// In-memory producers for tests
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::DuplexStream;

    use super::*;

    struct Launched {
        writer: Option<DuplexStream>,
        killed: Arc<AtomicBool>,
    }

    /// Launcher whose producers are fed by the test through duplex pipes
    #[derive(Default)]
    pub(crate) struct FakeLauncher {
        launches: AtomicUsize,
        fail: AtomicBool,
        terminate_delay_ms: AtomicU64,
        launched: Mutex<Vec<Launched>>,
    }

    impl FakeLauncher {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make subsequent launches fail (or succeed again)
        pub(crate) fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Make producers launched from now on take `delay` to terminate
        pub(crate) fn set_terminate_delay(&self, delay: Duration) {
            self.terminate_delay_ms
                .store(delay.as_millis() as u64, Ordering::SeqCst);
        }

        /// Number of launch attempts that produced a process
        pub(crate) fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        /// Take the write side of the `n`th producer's output
        ///
        /// Dropping it makes the producer hit end-of-stream.
        pub(crate) fn writer(&self, n: usize) -> DuplexStream {
            self.launched.lock()[n]
                .writer
                .take()
                .expect("writer already taken")
        }

        /// Whether the `n`th producer has been terminated
        pub(crate) fn killed(&self, n: usize) -> bool {
            self.launched.lock()[n].killed.load(Ordering::SeqCst)
        }
    }

    struct FakeProducer {
        output: Option<DuplexStream>,
        killed: Arc<AtomicBool>,
        terminate_delay: Duration,
    }

    #[async_trait]
    impl Producer for FakeProducer {
        fn take_output(&mut self) -> Option<ProducerOutput> {
            self.output.take().map(|o| Box::new(o) as ProducerOutput)
        }

        async fn terminate(&mut self) -> std::io::Result<()> {
            if !self.terminate_delay.is_zero() {
                tokio::time::sleep(self.terminate_delay).await;
            }
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, key: &SourceKey) -> Result<Box<dyn Producer>, RegistryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RegistryError::unavailable(key, "launch refused"));
            }

            let (writer, reader) = tokio::io::duplex(64 * 1024);
            let killed = Arc::new(AtomicBool::new(false));

            self.launched.lock().push(Launched {
                writer: Some(writer),
                killed: Arc::clone(&killed),
            });
            self.launches.fetch_add(1, Ordering::SeqCst);

            Ok(Box::new(FakeProducer {
                output: Some(reader),
                killed,
                terminate_delay: Duration::from_millis(
                    self.terminate_delay_ms.load(Ordering::SeqCst),
                ),
            }))
        }
    }
}
