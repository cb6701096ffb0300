use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::error::{FrameError, Result};

/// Frame prefix: payload length (4 bytes, little-endian).
pub const PREFIX_SIZE: usize = 4;

/// Maximum payload size: 4 MiB.
pub const MAX_PAYLOAD_LEN: usize = 4_194_304;

/// Maximum frame size including the length prefix.
pub const MAX_MESSAGE_LEN: usize = MAX_PAYLOAD_LEN + PREFIX_SIZE;

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────────────────────┐
/// │ Length       │ Payload                             │
/// │ (4B LE)      │ (Length bytes, byte 0 = kind tag)   │
/// └──────────────┴─────────────────────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(PREFIX_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 4 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_LEN,
        }
    }
}

/// `tokio_util` encoder for outbound worker frames.
///
/// Payloads larger than the configured maximum are refused with
/// [`FrameError::PayloadTooLarge`] before anything is written. Inbound
/// framing goes through [`RecvBuffer`](crate::buffer::RecvBuffer).
#[derive(Debug, Clone, Default)]
pub struct WorkerCodec {
    config: FrameConfig,
}

impl WorkerCodec {
    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Encoder<Bytes> for WorkerCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(&payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_le_length_prefix() {
        let mut buf = BytesMut::new();
        let payload = b"{\"id\":1,\"accepted\":true}";

        encode_frame(payload, &mut buf).unwrap();

        assert_eq!(buf.len(), PREFIX_SIZE + payload.len());
        assert_eq!(&buf[..4], &(payload.len() as u32).to_le_bytes());
        assert_eq!(&buf[4..], payload);
    }

    #[test]
    fn test_frames_are_appended_back_to_back() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"", &mut buf).unwrap();

        assert_eq!(buf.len(), 2 * PREFIX_SIZE + 5);
        assert_eq!(&buf[9..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_codec_rejects_oversized_outbound_payload() {
        let mut codec = WorkerCodec::with_config(FrameConfig {
            max_payload_size: 4,
        });
        let mut dst = BytesMut::new();

        let err = codec
            .encode(Bytes::from_static(b"oversized"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_codec_accepts_maximum_payload() {
        let mut codec = WorkerCodec::default();
        let mut dst = BytesMut::new();

        codec
            .encode(Bytes::from(vec![0u8; MAX_PAYLOAD_LEN]), &mut dst)
            .unwrap();
        assert_eq!(dst.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_max_message_len_matches_prefix_plus_payload() {
        assert_eq!(MAX_MESSAGE_LEN, 4_194_308);
        assert_eq!(MAX_PAYLOAD_LEN, 4 * 1024 * 1024);
    }
}
