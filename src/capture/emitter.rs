//! Interval-driven chunk emission shared by the bundled capture sources
//!
//! The emitter task ticks every `interval`, asks its producer for up to one
//! chunk worth of bytes and forwards non-empty results. On stop it emits a
//! final chunk sized to the part of the interval that had elapsed, then
//! drops the sender so the receiver sees the end of the stream.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Capacity of the chunk channel between emitter and session
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Supplies encoded bytes to the emitter
#[async_trait::async_trait]
pub trait ChunkProducer: Send + 'static {
    /// Return at most `max_len` bytes. An empty result means no data
    /// right now and is not forwarded.
    async fn produce(&mut self, max_len: usize) -> std::io::Result<Bytes>;
}

/// Handle to a running emitter task
pub struct Emitter {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Emitter {
    /// Spawn the emitter. The first chunk arrives one `interval` after start.
    pub fn spawn<P: ChunkProducer>(
        producer: P,
        interval: Duration,
        chunk_size: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(producer, interval, chunk_size, chunk_tx, stop_rx));
        (
            Self {
                stop_tx: Some(stop_tx),
                task: Some(task),
            },
            chunk_rx,
        )
    }

    /// Stop ticking, flush the final partial chunk and wait for the task
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Capture emitter task failed: {}", e);
            }
        }
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<P: ChunkProducer>(
    mut producer: P,
    interval: Duration,
    chunk_size: usize,
    chunk_tx: mpsc::Sender<Bytes>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_emit = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut stop_rx => break,
        }
        last_emit = Instant::now();

        // Wait for room before reading so a stop never strands a chunk
        let permit = tokio::select! {
            permit = chunk_tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("Chunk receiver dropped, stopping capture");
                    return;
                }
            },
            _ = &mut stop_rx => break,
        };

        match producer.produce(chunk_size).await {
            Ok(data) if data.is_empty() => {}
            Ok(data) => permit.send(data),
            Err(e) => {
                tracing::error!("Capture read failed: {}", e);
                return;
            }
        }
    }

    // The stopping side may be the only reader, so the flush never waits
    let partial = partial_len(chunk_size, last_emit.elapsed(), interval);
    match producer.produce(partial).await {
        Ok(data) if data.is_empty() => {}
        Ok(data) => {
            let len = data.len();
            match chunk_tx.try_send(data) {
                Ok(()) => tracing::debug!("Flushed final chunk ({} bytes)", len),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Chunk channel full, final chunk ({} bytes) dropped", len);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Err(e) => tracing::error!("Capture read failed on stop: {}", e),
    }
}

/// Share of a full chunk covering `elapsed` out of `interval`, at least one byte
fn partial_len(chunk_size: usize, elapsed: Duration, interval: Duration) -> usize {
    if interval.is_zero() {
        return chunk_size.max(1);
    }
    let ratio = (elapsed.as_secs_f64() / interval.as_secs_f64()).min(1.0);
    ((chunk_size as f64 * ratio) as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        calls: u8,
    }

    #[async_trait::async_trait]
    impl ChunkProducer for Counter {
        async fn produce(&mut self, max_len: usize) -> std::io::Result<Bytes> {
            self.calls += 1;
            Ok(Bytes::from(vec![self.calls; max_len]))
        }
    }

    #[test]
    fn test_partial_len() {
        let second = Duration::from_secs(1);
        assert_eq!(partial_len(1000, Duration::from_millis(250), second), 250);
        assert_eq!(partial_len(1000, Duration::ZERO, second), 1);
        assert_eq!(partial_len(1000, Duration::from_secs(5), second), 1000);
        assert_eq!(partial_len(10, Duration::from_secs(1), Duration::ZERO), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_on_interval_and_flushes_on_stop() {
        let (mut emitter, mut rx) =
            Emitter::spawn(Counter { calls: 0 }, Duration::from_secs(1), 100);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.len(), 100);
        assert_eq!(first[0], 1);
        assert_eq!(second[0], 2);

        emitter.stop().await;
        let last = rx.recv().await.unwrap();
        assert_eq!(last[0], 3);
        assert_eq!(last.len(), 50);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_with_full_channel() {
        let (mut emitter, mut rx) =
            Emitter::spawn(Counter { calls: 0 }, Duration::from_millis(10), 4);

        // Nobody reads for far longer than the channel can buffer
        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::time::timeout(Duration::from_secs(1), emitter.stop())
            .await
            .expect("stop blocked on a full channel");

        let mut received = 0;
        while let Some(chunk) = rx.recv().await {
            assert_eq!(chunk.len(), 4);
            received += 1;
        }
        assert_eq!(received, CHUNK_CHANNEL_CAPACITY);
    }
}
