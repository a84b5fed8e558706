//! Pending chunk queue
//!
//! Chunks produced by the capture device wait here until the flush loop
//! hands them to the control channel, oldest first.

use bytes::Bytes;
use std::collections::VecDeque;

/// One unit of encoded media as emitted by the capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in capture order, starting at 0. Never sent on the wire.
    pub seq: u64,
    /// Opaque encoded media
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// FIFO of chunks not yet handed to the channel
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: VecDeque<Chunk>,
    next_seq: u64,
    queued_bytes: usize,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append captured data, returning the sequence number it was given
    pub fn push(&mut self, data: Bytes) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued_bytes += data.len();
        self.chunks.push_back(Chunk { seq, data });
        seq
    }

    /// Remove the oldest chunk
    pub fn pop(&mut self) -> Option<Chunk> {
        let chunk = self.chunks.pop_front()?;
        self.queued_bytes -= chunk.len();
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes currently waiting
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }
}
