//! Control-plane client for an out-of-process media router worker.
//!
//! The worker is a separate process speaking a length-prefixed protocol over a
//! pair of byte streams. This crate drives it through an entity graph that
//! mirrors the worker's own objects.
//!
//! # Crate Structure
//!
//! - [`frame`]: Length-prefixed framing over byte streams
//! - [`channel`]: Requests, responses and notifications over framed streams
//! - [`Worker`] → [`Router`] → [`Transport`] → [`Producer`], [`Consumer`],
//!   [`DataProducer`], [`DataConsumer`]
//! - [`events`]: Typed event emitters used by every entity
//! - [`negotiation`]: RTP/SCTP capability negotiation seam
//! - [`logging`]: `tracing` subscriber setup (behind `logging` feature)

/// Re-export frame types.
pub mod frame {
    pub use sfuctl_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use sfuctl_channel::*;
}

pub mod data;
pub mod events;
pub mod negotiation;
pub mod sctp;

mod consumer;
mod data_consumer;
mod data_producer;
mod error;
mod producer;
mod registry;
mod router;
mod transport;
mod worker;

#[cfg(feature = "logging")]
pub mod logging;

pub use consumer::{Consumer, ConsumerEvent, ConsumerEventKind, ConsumerObserverEvent, ConsumerObserverEventKind, ConsumerOptions};
pub use data_consumer::{
    DataConsumer, DataConsumerEvent, DataConsumerEventKind, DataConsumerObserverEvent, DataConsumerObserverEventKind,
    DataConsumerOptions,
};
pub use data_producer::{
    DataProducer, DataProducerEvent, DataProducerEventKind, DataProducerObserverEvent, DataProducerObserverEventKind,
    DataProducerOptions,
};
pub use error::{Error, Result};
pub use producer::{Producer, ProducerEvent, ProducerEventKind, ProducerObserverEvent, ProducerObserverEventKind, ProducerOptions};
pub use router::{Router, RouterEvent, RouterEventKind, RouterObserverEvent, RouterObserverEventKind, RouterOptions};
pub use transport::{
    Transport, TransportEvent, TransportEventKind, TransportObserverEvent, TransportObserverEventKind,
    TransportOptions, TransportTraceEventType,
};
pub use worker::{Worker, WorkerEvent, WorkerEventKind, WorkerObserverEvent, WorkerObserverEventKind, WorkerSettings};
