//! Media capture module
//!
//! A capture source stands in for the platform media recorder: once
//! acquired it emits opaque encoded chunks on a fixed interval until
//! stopped, then flushes one final partial chunk.

pub mod emitter;
pub mod file;
pub mod pattern;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

/// Source name that selects the synthetic test pattern instead of a file
pub const TEST_PATTERN_SOURCE: &str = "test-pattern";

/// Container/codec combinations the bundled sources can emit
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "video/webm",
    "video/webm;codecs=vp8",
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=vp9,opus",
    "audio/webm;codecs=opus",
];

/// What the caller asks the device for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub mime_type: String,
    pub video: bool,
    pub audio: bool,
    pub echo_cancellation: bool,
    pub audio_bits_per_second: u32,
    pub video_bits_per_second: u32,
}

impl From<&CaptureConfig> for CaptureConstraints {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            mime_type: config.mime_type.clone(),
            video: config.video,
            audio: config.audio,
            echo_cancellation: config.echo_cancellation,
            audio_bits_per_second: config.audio_bits_per_second,
            video_bits_per_second: config.video_bits_per_second,
        }
    }
}

impl CaptureConstraints {
    /// Encoded bytes per second implied by the requested tracks
    pub fn bytes_per_second(&self) -> u64 {
        let mut bits = 0u64;
        if self.audio {
            bits += u64::from(self.audio_bits_per_second);
        }
        if self.video {
            bits += u64::from(self.video_bits_per_second);
        }
        bits / 8
    }

    /// Size of one full chunk emitted every `interval` (at least one byte)
    pub fn chunk_size(&self, interval: Duration) -> usize {
        let bytes = self.bytes_per_second() as u128 * interval.as_millis() / 1000;
        bytes.max(1) as usize
    }
}

/// Description of an acquired device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub mime_type: String,
}

/// Trait for capture device implementations
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Whether the source can produce `mime_type`
    fn is_type_supported(&self, mime_type: &str) -> bool {
        is_supported_mime_type(mime_type)
    }

    /// Acquire the device. Must succeed before `start`.
    async fn acquire(&mut self, constraints: &CaptureConstraints)
        -> Result<DeviceInfo, CaptureError>;

    /// Begin emitting chunks every `interval`.
    /// The receiver closes after `stop` has flushed the final chunk.
    async fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<Bytes>, CaptureError>;

    /// Stop emitting. The final partial chunk is in the channel on return.
    async fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Case- and whitespace-insensitive match against [`SUPPORTED_MIME_TYPES`]
pub fn is_supported_mime_type(mime_type: &str) -> bool {
    let normalized: String = mime_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    SUPPORTED_MIME_TYPES.contains(&normalized.as_str())
}

/// Factory function to create the configured capture source
pub fn create_capture(config: &CaptureConfig) -> Box<dyn CaptureSource> {
    match config.source.as_deref() {
        Some(TEST_PATTERN_SOURCE) => Box::new(pattern::PatternCapture::new()),
        Some(path) => Box::new(file::FileCapture::new(Some(path.into()))),
        None => Box::new(file::FileCapture::new(None)),
    }
}
