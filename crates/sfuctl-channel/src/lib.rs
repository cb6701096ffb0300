//! Control channel to an SFU worker process.
//!
//! A [`Channel`] runs a request/response and notification protocol over a
//! pair of length-prefixed byte streams. Requests get a 32-bit id and settle
//! when the worker answers or the channel closes. Notifications are keyed by
//! the id of the entity they target and are dispatched to subscribers after
//! the responses that arrived in the same batch.

pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod method;
pub mod subscribers;
#[cfg(feature = "testing")]
pub mod testing;
pub mod tracker;
pub mod wire;

pub use channel::{Channel, FromResponse, ResponseFuture};
pub use config::ChannelConfig;
pub use error::{ClassifyError, RejectKind, RequestError, Result};
pub use message::{classify, JsonMessage, Message, WorkerLogLevel};
pub use method::{Event, Method};
pub use subscribers::{Notification, NotificationData, Subscribers, SubscriptionId};
pub use tracker::{RequestTracker, Response};
pub use wire::{
    ConsumeRequest, ConsumeResponse, ConsumerLayers, ConsumerScore, MediaKind, NotificationBody,
    ProducerScore, RequestBody, ResponseBody, WireMessage, WireNotification, WireRequest,
    WireResponse,
};
