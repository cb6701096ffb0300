use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::buffer::RecvBuffer;
use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete payloads from any `AsyncRead` stream.
///
/// Handles partial reads internally. Each call to [`read_batch`](Self::read_batch)
/// reads one chunk and returns every payload that chunk completed, so callers
/// can process a batch as a unit.
pub struct FrameReader<T> {
    inner: T,
    buf: RecvBuffer,
    chunk: Box<[u8]>,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: RecvBuffer::with_max_size(config.max_payload_size),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            config,
        }
    }

    /// Read until at least one payload is complete and return the batch.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached and
    /// `Err(FrameError::BufferOverflow)` when buffered data had to be
    /// discarded. The reader stays usable after an overflow.
    pub async fn read_batch(&mut self) -> Result<Vec<Bytes>> {
        loop {
            let read = match self.inner.read(&mut self.chunk).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            let frames = self.buf.push(&self.chunk[..read])?;
            if !frames.is_empty() {
                trace!(count = frames.len(), buffered = self.buf.len(), "read frame batch");
                return Ok(frames);
            }
        }
    }

    /// Bytes buffered but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
