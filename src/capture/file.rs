//! File-backed capture source
//!
//! Replays a pre-encoded media file (typically a `.webm` recording) as if
//! it came from a live recorder: bytes are read at the rate implied by the
//! configured bitrates and emitted on the capture interval. Once the file
//! is exhausted the device simply produces no more data.

use super::emitter::{ChunkProducer, Emitter};
use super::{CaptureConstraints, CaptureSource, DeviceInfo};
use crate::error::CaptureError;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

/// Capture source reading from a media file
pub struct FileCapture {
    path: Option<PathBuf>,
    constraints: Option<CaptureConstraints>,
    emitter: Option<Emitter>,
}

impl FileCapture {
    /// Create a source for `path`. `None` means no device is configured
    /// and acquisition fails with `DeviceUnavailable`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            constraints: None,
            emitter: None,
        }
    }
}

struct FileProducer {
    file: tokio::fs::File,
    exhausted: bool,
}

#[async_trait::async_trait]
impl ChunkProducer for FileProducer {
    async fn produce(&mut self, max_len: usize) -> std::io::Result<Bytes> {
        if self.exhausted {
            return Ok(Bytes::new());
        }
        let mut buf = Vec::with_capacity(max_len);
        (&mut self.file).take(max_len as u64).read_to_end(&mut buf).await?;
        if buf.len() < max_len {
            tracing::debug!("Capture source exhausted");
            self.exhausted = true;
        }
        Ok(Bytes::from(buf))
    }
}

#[async_trait::async_trait]
impl CaptureSource for FileCapture {
    fn name(&self) -> &str {
        "file"
    }

    async fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<DeviceInfo, CaptureError> {
        if !self.is_type_supported(&constraints.mime_type) {
            return Err(CaptureError::NotSupported(constraints.mime_type.clone()));
        }
        if !constraints.audio && !constraints.video {
            return Err(CaptureError::NotSupported(
                "no audio or video track requested".to_string(),
            ));
        }

        let path = self.path.as_ref().ok_or_else(|| {
            CaptureError::DeviceUnavailable("no capture source configured".to_string())
        })?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CaptureError::from(e).with_context(path))?;
        if !metadata.is_file() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is not a media file",
                path.display()
            )));
        }
        // Opening proves read permission; the handle used for capture is
        // opened again on start so each recording begins at the start.
        tokio::fs::File::open(path)
            .await
            .map_err(|e| CaptureError::from(e).with_context(path))?;

        tracing::info!(
            "Using capture source: {} ({} bytes, {})",
            path.display(),
            metadata.len(),
            constraints.mime_type
        );
        self.constraints = Some(constraints.clone());

        Ok(DeviceInfo {
            name: path.display().to_string(),
            mime_type: constraints.mime_type.clone(),
        })
    }

    async fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        let constraints = self.constraints.as_ref().ok_or(CaptureError::NotAcquired)?;
        let path = self.path.as_ref().ok_or(CaptureError::NotAcquired)?;
        if self.emitter.is_some() {
            return Err(CaptureError::Stream("capture already started".to_string()));
        }

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| CaptureError::from(e).with_context(path))?;
        let chunk_size = constraints.chunk_size(interval);
        tracing::debug!(
            "Starting file capture: {} byte chunks every {}ms",
            chunk_size,
            interval.as_millis()
        );

        let producer = FileProducer {
            file,
            exhausted: false,
        };
        let (emitter, rx) = Emitter::spawn(producer, interval, chunk_size);
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

impl CaptureError {
    fn with_context(self, path: &std::path::Path) -> Self {
        match self {
            CaptureError::DeviceUnavailable(msg) => {
                CaptureError::DeviceUnavailable(format!("{}: {}", path.display(), msg))
            }
            CaptureError::PermissionDenied(msg) => {
                CaptureError::PermissionDenied(format!("{}: {}", path.display(), msg))
            }
            other => other,
        }
    }
}
