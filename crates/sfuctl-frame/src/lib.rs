//! Length-prefixed message framing for the SFU worker control channel.
//!
//! Every message on the wire is framed with:
//! - A 4-byte little-endian payload length
//! - The payload itself, whose first byte tells what kind of message it is
//!
//! The receive side accumulates arbitrary chunks and hands out complete
//! payloads; callers never see partial reads.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use buffer::RecvBuffer;
pub use codec::{encode_frame, FrameConfig, WorkerCodec, MAX_MESSAGE_LEN, MAX_PAYLOAD_LEN, PREFIX_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
