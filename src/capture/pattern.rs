//! Synthetic capture source
//!
//! Emits numbered filler chunks without touching any device. Useful for
//! exercising a server end to end and for tests. Each chunk begins with its
//! 0-based index as a big-endian u64 followed by `0xAB` filler bytes.

use super::emitter::{ChunkProducer, Emitter};
use super::{CaptureConstraints, CaptureSource, DeviceInfo};
use crate::error::CaptureError;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::mpsc;

/// Bytes taken by the index header
pub const INDEX_LEN: usize = 8;

const FILLER: u8 = 0xAB;

/// Capture source producing synthetic chunks
pub struct PatternCapture {
    chunk_size: Option<usize>,
    constraints: Option<CaptureConstraints>,
    emitter: Option<Emitter>,
}

impl PatternCapture {
    /// Chunk size follows the configured bitrates
    pub fn new() -> Self {
        Self {
            chunk_size: None,
            constraints: None,
            emitter: None,
        }
    }

    /// Fixed chunk size regardless of bitrate
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: Some(chunk_size.max(INDEX_LEN)),
            ..Self::new()
        }
    }
}

impl Default for PatternCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Index stamped into a chunk produced by this source
pub fn chunk_index(chunk: &[u8]) -> Option<u64> {
    let header: [u8; INDEX_LEN] = chunk.get(..INDEX_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(header))
}

struct PatternProducer {
    next_index: u64,
}

#[async_trait::async_trait]
impl ChunkProducer for PatternProducer {
    async fn produce(&mut self, max_len: usize) -> std::io::Result<Bytes> {
        let len = max_len.max(INDEX_LEN);
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u64(self.next_index);
        buf.put_bytes(FILLER, len - INDEX_LEN);
        self.next_index += 1;
        Ok(buf.freeze())
    }
}

#[async_trait::async_trait]
impl CaptureSource for PatternCapture {
    fn name(&self) -> &str {
        "test-pattern"
    }

    async fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<DeviceInfo, CaptureError> {
        if !self.is_type_supported(&constraints.mime_type) {
            return Err(CaptureError::NotSupported(constraints.mime_type.clone()));
        }
        self.constraints = Some(constraints.clone());
        Ok(DeviceInfo {
            name: "test pattern".to_string(),
            mime_type: constraints.mime_type.clone(),
        })
    }

    async fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        let constraints = self.constraints.as_ref().ok_or(CaptureError::NotAcquired)?;
        if self.emitter.is_some() {
            return Err(CaptureError::Stream("capture already started".to_string()));
        }
        let chunk_size = self
            .chunk_size
            .unwrap_or_else(|| constraints.chunk_size(interval).max(INDEX_LEN));

        let (emitter, rx) = Emitter::spawn(PatternProducer { next_index: 0 }, interval, chunk_size);
        self.emitter = Some(emitter);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        match self.emitter.as_mut() {
            Some(emitter) => {
                emitter.stop().await;
                Ok(())
            }
            None => Err(CaptureError::NotAcquired),
        }
    }
}
