use std::fmt;

/// Kind tag attached to a request the worker refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// The worker reported a `TypeError`: the request carried invalid arguments.
    InvalidArgument,
    /// Any other worker-side failure.
    Failure,
}

impl RejectKind {
    /// Map the worker's `error` field to a kind.
    pub fn from_worker(error: Option<&str>) -> Self {
        match error {
            Some("TypeError") => Self::InvalidArgument,
            _ => Self::Failure,
        }
    }
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

/// Errors delivered to the caller of a request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The channel is closed, or closed while the request was pending.
    #[error("channel closed")]
    ChannelClosed,

    /// The encoded request does not fit in one frame.
    #[error("request too big: {size} bytes (max {max})")]
    TooBig { size: usize, max: usize },

    /// The worker refused the request.
    #[error("request rejected ({kind}): {reason}")]
    Rejected { kind: RejectKind, reason: String },

    /// Request data could not be serialized, or response data did not parse.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary request could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// The response used the other protocol variant or an unexpected body.
    #[error("unexpected response body")]
    UnexpectedResponse,
}

impl RequestError {
    /// Whether this is the distinguished closed-channel error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }

    /// Whether the worker (or the local size check) blamed the arguments.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::TooBig { .. }
                | Self::Rejected {
                    kind: RejectKind::InvalidArgument,
                    ..
                }
        )
    }
}

/// Per-message decode failures. Logged and dropped by the channel.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("empty payload")]
    Empty,

    #[error("malformed json message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("log line is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed binary message: {0}")]
    Binary(#[from] bincode::error::DecodeError),
}

pub type Result<T> = std::result::Result<T, RequestError>;
