use sfuctl_channel::RequestError;

/// Errors returned by entity operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Arguments failed synchronous validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity does not exist.
    #[error("{kind} with id \"{id}\" not found")]
    NotFound { kind: &'static str, id: String },

    /// The entity (or its parent) is closed.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Every SCTP stream id of the transport is in use.
    #[error("no sctpStreamId available")]
    NoSctpStreamId,

    /// The channel request failed or was rejected by the worker.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A worker payload did not have the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Closed entity, or closed channel.
    pub fn is_invalid_state(&self) -> bool {
        match self {
            Self::InvalidState(_) => true,
            Self::Request(err) => err.is_invalid_state(),
            _ => false,
        }
    }

    /// Rejected arguments, locally or by the worker.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => true,
            Self::Request(err) => err.is_invalid_argument(),
            _ => false,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
