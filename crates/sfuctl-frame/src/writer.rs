use bytes::Bytes;
use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::{FrameConfig, WorkerCodec};
use crate::error::Result;

/// Writes complete frames to any `AsyncWrite` stream.
///
/// The length prefix and the payload of one frame are encoded into the same
/// write buffer, so two frames can never interleave on the wire.
pub struct FrameWriter<T> {
    inner: FramedWrite<T, WorkerCodec>,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner: FramedWrite::new(inner, WorkerCodec::with_config(config)),
        }
    }

    /// Encode and send one payload, then flush.
    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        self.inner.send(payload).await
    }

    /// Encode several payloads and flush them with a single write.
    pub async fn send_all(&mut self, payloads: impl IntoIterator<Item = Bytes>) -> Result<()> {
        for payload in payloads {
            self.inner.feed(payload).await?;
        }
        self.inner.flush().await
    }

    /// Flush pending frames and shut down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.close().await
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        self.inner.encoder().config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RecvBuffer;
    use crate::error::FrameError;
    use crate::reader::FrameReader;

    #[tokio::test]
    async fn write_single_frame() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());

        writer.send(Bytes::from_static(b"r1:worker.dump::null")).await.unwrap();

        let frames = RecvBuffer::new().push(&writer.into_inner()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"r1:worker.dump::null");
    }

    #[tokio::test]
    async fn write_multiple_frames_in_order() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());

        writer
            .send_all([
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three"),
            ])
            .await
            .unwrap();

        let frames = RecvBuffer::new().push(&writer.into_inner()).unwrap();
        let got: Vec<&[u8]> = frames.iter().map(|f| f.as_ref()).collect();
        assert_eq!(got, vec![b"one".as_ref(), b"two".as_ref(), b"three".as_ref()]);
    }

    #[tokio::test]
    async fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
        };
        let mut writer = FrameWriter::with_config(Vec::<u8>::new(), cfg);

        let err = writer.send(Bytes::from_static(b"oversized")).await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn written_bytes_read_back_over_duplex() {
        let (tx, rx) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(tx);
        let mut reader = FrameReader::new(rx);

        writer.send(Bytes::from_static(b"ping")).await.unwrap();
        let batch = reader.read_batch().await.unwrap();

        assert_eq!(batch[0].as_ref(), b"ping");
    }

    #[tokio::test]
    async fn shutdown_signals_eof() {
        let (tx, rx) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(tx);
        let mut reader = FrameReader::new(rx);

        writer.send(Bytes::from_static(b"last")).await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(reader.read_batch().await.unwrap()[0].as_ref(), b"last");
        let err = reader.read_batch().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }
}
