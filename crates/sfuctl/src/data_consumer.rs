use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use sfuctl_channel::{
    Channel, Event as WorkerEvent, Method, Notification, NotificationBody, NotificationData, RequestBody,
    RequestError, ResponseBody,
};
use tracing::{debug, warn};

use crate::data::{dump_json, json_data, AppData, DataType, SctpStreamParameters};
use crate::error::Result;
use crate::events::{Emitter, HandlerId, InternalEvent};

crate::events! {
    /// Events of a [`DataConsumer`] for its owner.
    pub enum DataConsumerEvent: DataConsumerEventKind {
        TransportClose,
        /// The data producer being consumed closed, and so did the consumer.
        DataProducerClose,
        SctpSendBufferFull,
        /// The send buffer dropped below the low threshold. Carries the
        /// buffered amount in bytes.
        BufferedAmountLow(u32),
        /// A message with its PPID.
        Message(u32, Vec<u8>),
    }
}

crate::events! {
    /// Events of a [`DataConsumer`] for monitoring.
    pub enum DataConsumerObserverEvent: DataConsumerObserverEventKind {
        Close,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BufferedAmountLow {
    buffered_amount: u32,
}

/// Options for [`Transport::consume_data`](crate::Transport::consume_data).
///
/// The reliability fields override the data producer's SCTP stream
/// parameters. They are ignored on direct transports.
#[derive(Debug, Clone, Default)]
pub struct DataConsumerOptions {
    pub data_producer_id: String,
    pub ordered: Option<bool>,
    pub max_packet_life_time: Option<u16>,
    pub max_retransmits: Option<u16>,
    pub app_data: AppData,
}

impl DataConsumerOptions {
    pub fn new(data_producer_id: impl Into<String>) -> Self {
        Self {
            data_producer_id: data_producer_id.into(),
            ..Self::default()
        }
    }
}

pub(crate) struct DataConsumerParams {
    pub id: String,
    pub data_producer_id: String,
    pub transport_id: String,
    pub data_type: DataType,
    pub sctp_stream_parameters: Option<SctpStreamParameters>,
    pub label: String,
    pub protocol: String,
    pub app_data: AppData,
    pub channel: Channel,
}

struct Inner {
    id: String,
    data_producer_id: String,
    transport_id: String,
    data_type: DataType,
    sctp_stream_parameters: Option<SctpStreamParameters>,
    label: String,
    protocol: String,
    app_data: AppData,
    channel: Channel,
    closed: AtomicBool,
    events: Emitter<DataConsumerEvent>,
    observer: Emitter<DataConsumerObserverEvent>,
    internal: Emitter<InternalEvent>,
}

/// Forwards the messages of one data producer to an endpoint.
#[derive(Clone)]
pub struct DataConsumer {
    inner: Arc<Inner>,
}

impl DataConsumer {
    pub(crate) fn new(params: DataConsumerParams) -> Self {
        debug!(id = %params.id, "constructor()");

        let consumer = Self {
            inner: Arc::new(Inner {
                id: params.id,
                data_producer_id: params.data_producer_id,
                transport_id: params.transport_id,
                data_type: params.data_type,
                sctp_stream_parameters: params.sctp_stream_parameters,
                label: params.label,
                protocol: params.protocol,
                app_data: params.app_data,
                channel: params.channel,
                closed: AtomicBool::new(false),
                events: Emitter::new(),
                observer: Emitter::new(),
                internal: Emitter::new(),
            }),
        };
        consumer.handle_worker_notifications();
        consumer
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn data_producer_id(&self) -> &str {
        &self.inner.data_producer_id
    }

    pub fn data_type(&self) -> DataType {
        self.inner.data_type
    }

    pub fn sctp_stream_parameters(&self) -> Option<SctpStreamParameters> {
        self.inner.sctp_stream_parameters
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn on<F>(&self, kind: DataConsumerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&DataConsumerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<DataConsumerObserverEvent> {
        &self.inner.observer
    }

    pub(crate) fn internal(&self) -> &Emitter<InternalEvent> {
        &self.inner.internal
    }

    /// Close the data consumer.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "close()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        let _ = self.inner.channel.request_binary(
            Method::TransportCloseDataConsumer,
            Some(self.inner.transport_id.as_str()),
            RequestBody::CloseDataConsumer {
                data_consumer_id: self.inner.id.clone(),
            },
        );

        self.inner.internal.emit(&InternalEvent::Close);
        self.inner.observer.emit(&DataConsumerObserverEvent::Close);
    }

    /// The owning transport closed.
    pub(crate) fn transport_closed(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "transportClosed()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        self.inner.events.emit(&DataConsumerEvent::TransportClose);
        self.inner.observer.emit(&DataConsumerObserverEvent::Close);
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "dump()");
        let body = self
            .inner
            .channel
            .request_binary(Method::DataConsumerDump, Some(self.inner.id.as_str()), RequestBody::None)?
            .await?;
        dump_json(body)
    }

    pub async fn get_stats(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "getStats()");
        let body = self
            .inner
            .channel
            .request_binary(
                Method::DataConsumerGetStats,
                Some(self.inner.id.as_str()),
                RequestBody::None,
            )?
            .await?;
        dump_json(body)
    }

    /// Bytes queued in the SCTP send buffer.
    pub async fn get_buffered_amount(&self) -> Result<u32> {
        debug!(id = %self.inner.id, "getBufferedAmount()");
        let body = self
            .inner
            .channel
            .request_binary(
                Method::DataConsumerGetBufferedAmount,
                Some(self.inner.id.as_str()),
                RequestBody::None,
            )?
            .await?;

        match body {
            ResponseBody::BufferedAmount(amount) => Ok(amount),
            _ => Err(RequestError::UnexpectedResponse.into()),
        }
    }

    fn handle_worker_notifications(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.channel.subscribe(&self.inner.id, move |notification| {
            if let Some(inner) = weak.upgrade() {
                DataConsumer { inner }.on_notification(notification);
            }
        });
    }

    fn on_notification(&self, notification: &Notification) {
        let inner = &self.inner;
        match notification.event {
            WorkerEvent::DataProducerClose => {
                if inner.closed.swap(true, Ordering::SeqCst) {
                    return;
                }

                inner.channel.unsubscribe_all(&inner.id);

                inner.internal.emit(&InternalEvent::UpstreamClose);
                inner.events.emit(&DataConsumerEvent::DataProducerClose);
                inner.observer.emit(&DataConsumerObserverEvent::Close);
            }
            WorkerEvent::SctpSendBufferFull => {
                inner.events.emit(&DataConsumerEvent::SctpSendBufferFull);
            }
            WorkerEvent::BufferedAmountLow => {
                let amount = match &notification.data {
                    NotificationData::Binary(NotificationBody::BufferedAmountLow(amount)) => Some(*amount),
                    data => json_data::<BufferedAmountLow>(data).map(|low| low.buffered_amount),
                };
                if let Some(amount) = amount {
                    inner.events.emit(&DataConsumerEvent::BufferedAmountLow(amount));
                }
            }
            WorkerEvent::Message => {
                if inner.closed() {
                    return;
                }
                match &notification.data {
                    NotificationData::Binary(NotificationBody::Message { ppid, data }) => {
                        inner.events.emit(&DataConsumerEvent::Message(*ppid, data.clone()));
                    }
                    _ => warn!(id = %inner.id, "message notification without binary body"),
                }
            }
            other => debug!(id = %inner.id, event = %other, "ignoring unknown event"),
        }
    }
}

impl Inner {
    fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for DataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConsumer")
            .field("id", &self.inner.id)
            .field("data_producer_id", &self.inner.data_producer_id)
            .field("data_type", &self.inner.data_type)
            .field("closed", &self.closed())
            .finish()
    }
}
