//! Output pump
//!
//! One task per broadcaster. It reads the producer's output until end-of-file,
//! a read error, or cancellation, then kills and reaps the producer. This task
//! is the only place the producer is ever terminated.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;

use super::{Broadcaster, DrainReason};
use crate::process::{Producer, ProducerOutput};

pub(super) async fn run(broadcaster: Arc<Broadcaster>, mut producer: Box<dyn Producer>) {
    let reason = match producer.take_output() {
        Some(output) => pump(&broadcaster, output).await,
        None => {
            tracing::warn!(source = %broadcaster.key, "Producer has no output stream");
            DrainReason::ProducerExited
        }
    };

    // No-op when a detach or shutdown already started the drain.
    broadcaster.begin_drain(reason);

    if let Err(e) = producer.terminate().await {
        tracing::warn!(
            source = %broadcaster.key,
            broadcaster = broadcaster.id,
            error = %e,
            "Failed to terminate producer"
        );
    }

    broadcaster.mark_terminated();

    let stats = broadcaster.stats();
    tracing::info!(
        source = %stats.key,
        broadcaster = stats.broadcaster_id,
        reason = ?broadcaster.drain_reason(),
        bytes_read = stats.bytes_read,
        chunks_dropped = stats.chunks_dropped,
        bitrate = stats.bitrate(),
        uptime_secs = stats.uptime.as_secs(),
        "Broadcaster terminated"
    );
}

async fn pump(broadcaster: &Broadcaster, mut output: ProducerOutput) -> DrainReason {
    let chunk_size = broadcaster.config.read_chunk_size;
    let mut buf = BytesMut::with_capacity(chunk_size);

    loop {
        buf.resize(chunk_size, 0);

        let read = tokio::select! {
            biased;
            _ = broadcaster.cancel.cancelled() => return DrainReason::Shutdown,
            read = output.read(&mut buf[..]) => read,
        };

        match read {
            Ok(0) => {
                tracing::info!(source = %broadcaster.key, "Producer reached end of stream");
                return DrainReason::ProducerExited;
            }
            Ok(n) => {
                buf.truncate(n);
                broadcaster.counters.record_read(n);
                broadcaster.fan_out(buf.split().freeze());
            }
            Err(e) => {
                tracing::warn!(
                    source = %broadcaster.key,
                    error = %e,
                    "Failed to read producer output"
                );
                return DrainReason::ReadError;
            }
        }
    }
}
