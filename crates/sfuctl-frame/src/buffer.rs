use bytes::{Bytes, BytesMut};

use crate::codec::{MAX_PAYLOAD_LEN, PREFIX_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Accumulates raw bytes received from the worker and splits them into
/// complete payloads.
///
/// Chunks may arrive with arbitrary boundaries: a chunk can split a length
/// prefix, carry several frames, or end mid-payload. Bytes that do not yet
/// form a complete frame are retained for the next [`push`](Self::push).
///
/// The buffer is bounded. Complete frames are drained first; if the bytes
/// left over still exceed one maximum-size frame (prefix included), the
/// stream is considered corrupt and every buffered byte is discarded. A
/// length prefix announcing more than the maximum payload never completes,
/// so such a frame always ends in a discard. The next well-formed frame
/// boundary resynchronizes the stream.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: BytesMut,
    max_size: usize,
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecvBuffer {
    /// Create a buffer for payloads up to [`MAX_PAYLOAD_LEN`].
    pub fn new() -> Self {
        Self::with_max_size(MAX_PAYLOAD_LEN)
    }

    /// Create a buffer for payloads up to `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(max_size + PREFIX_SIZE)),
            max_size,
        }
    }

    /// Append a chunk and extract every payload it completed.
    ///
    /// Returns [`FrameError::BufferOverflow`] after discarding all buffered
    /// data if the incomplete remainder grew past one maximum-size frame.
    /// Payloads completed by the same chunk are lost along with it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buf.extend_from_slice(chunk);
        let frames = self.drain_frames();

        let limit = self.max_size + PREFIX_SIZE;
        if self.buf.len() > limit {
            let size = self.buf.len();
            self.buf.clear();
            return Err(FrameError::BufferOverflow { size, max: limit });
        }

        Ok(frames)
    }

    /// Extract every complete payload currently buffered.
    ///
    /// The consumed prefix is dropped in one step once all complete frames have
    /// been located; the unconsumed remainder stays buffered.
    fn drain_frames(&mut self) -> Vec<Bytes> {
        let mut spans = Vec::new();
        let mut cursor = 0usize;

        while let Some(len) = payload_len(&self.buf[cursor..]) {
            if len > self.max_size {
                break; // Oversized, left for the overflow check
            }
            if self.buf.len() - cursor < PREFIX_SIZE + len {
                break; // Incomplete payload
            }

            spans.push((cursor + PREFIX_SIZE, len));
            cursor += PREFIX_SIZE + len;
        }

        if cursor == 0 {
            return Vec::new();
        }

        let consumed = self.buf.split_to(cursor).freeze();
        spans
            .into_iter()
            .map(|(start, len)| consumed.slice(start..start + len))
            .collect()
    }

    /// Number of bytes buffered but not yet framed.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no partial frame is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Largest payload this buffer accepts.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

fn payload_len(src: &[u8]) -> Option<usize> {
    let prefix: [u8; PREFIX_SIZE] = src.get(..PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(prefix) as usize)
}
