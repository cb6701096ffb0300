use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use sfuctl_channel::{Channel, Event as WorkerEvent, Method, NotificationBody, RequestBody};
use tracing::debug;

use crate::data::{dump_json, AppData, DataMessage, DataType, SctpStreamParameters};
use crate::error::{Error, Result};
use crate::events::{Emitter, HandlerId, InternalEvent};

/// PPID of an empty WebRTC string.
const PPID_STRING_EMPTY: u32 = 56;
/// PPID of an empty WebRTC binary message.
const PPID_BINARY_EMPTY: u32 = 57;

crate::events! {
    /// Events of a [`DataProducer`] for its owner.
    pub enum DataProducerEvent: DataProducerEventKind {
        TransportClose,
    }
}

crate::events! {
    /// Events of a [`DataProducer`] for monitoring.
    pub enum DataProducerObserverEvent: DataProducerObserverEventKind {
        Close,
    }
}

/// Options for [`Transport::produce_data`](crate::Transport::produce_data).
#[derive(Debug, Clone, Default)]
pub struct DataProducerOptions {
    pub id: Option<String>,
    /// Required unless producing on a direct transport.
    pub sctp_stream_parameters: Option<SctpStreamParameters>,
    pub label: String,
    pub protocol: String,
    pub app_data: AppData,
}

impl DataProducerOptions {
    /// Data producer over SCTP.
    pub fn new_sctp(sctp_stream_parameters: SctpStreamParameters) -> Self {
        Self {
            sctp_stream_parameters: Some(sctp_stream_parameters),
            ..Self::default()
        }
    }

    /// Data producer on a direct transport.
    pub fn new_direct() -> Self {
        Self::default()
    }
}

pub(crate) struct DataProducerParams {
    pub id: String,
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
    transport_id: String,
    data_type: DataType,
    sctp_stream_parameters: Option<SctpStreamParameters>,
    label: String,
    protocol: String,
    app_data: AppData,
    channel: Channel,
    closed: AtomicBool,
    events: Emitter<DataProducerEvent>,
    observer: Emitter<DataProducerObserverEvent>,
    internal: Emitter<InternalEvent>,
}

/// A data message source injected into a router through a transport.
#[derive(Clone)]
pub struct DataProducer {
    inner: Arc<Inner>,
}

impl DataProducer {
    pub(crate) fn new(params: DataProducerParams) -> Self {
        debug!(id = %params.id, "constructor()");

        Self {
            inner: Arc::new(Inner {
                id: params.id,
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
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn data_type(&self) -> DataType {
        self.inner.data_type
    }

    /// SCTP stream parameters, for `sctp` data producers.
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

    pub fn on<F>(&self, kind: DataProducerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&DataProducerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<DataProducerObserverEvent> {
        &self.inner.observer
    }

    pub(crate) fn internal(&self) -> &Emitter<InternalEvent> {
        &self.inner.internal
    }

    /// Close the data producer.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "close()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        let _ = self.inner.channel.request_binary(
            Method::TransportCloseDataProducer,
            Some(self.inner.transport_id.as_str()),
            RequestBody::CloseDataProducer {
                data_producer_id: self.inner.id.clone(),
            },
        );

        self.inner.internal.emit(&InternalEvent::Close);
        self.inner.observer.emit(&DataProducerObserverEvent::Close);
    }

    /// The owning transport closed.
    pub(crate) fn transport_closed(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "transportClosed()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        self.inner.events.emit(&DataProducerEvent::TransportClose);
        self.inner.observer.emit(&DataProducerObserverEvent::Close);
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "dump()");
        let body = self
            .inner
            .channel
            .request_binary(Method::DataProducerDump, Some(self.inner.id.as_str()), RequestBody::None)?
            .await?;
        dump_json(body)
    }

    pub async fn get_stats(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "getStats()");
        let body = self
            .inner
            .channel
            .request_binary(
                Method::DataProducerGetStats,
                Some(self.inner.id.as_str()),
                RequestBody::None,
            )?
            .await?;
        dump_json(body)
    }

    /// Send a message through a direct data producer.
    ///
    /// Without an explicit `ppid` the WebRTC default for the message is used.
    /// Empty messages cannot travel over SCTP, so PPID 56 sends a single space
    /// and PPID 57 a single zero byte.
    pub fn send(&self, message: impl Into<DataMessage>, ppid: Option<u32>) -> Result<()> {
        if self.closed() {
            return Err(Error::InvalidState("data producer closed"));
        }
        if self.inner.data_type != DataType::Direct {
            return Err(Error::InvalidState("not a direct data producer"));
        }

        let message = message.into();
        let ppid = ppid.unwrap_or_else(|| message.default_ppid());
        let data = match ppid {
            PPID_STRING_EMPTY => b" ".to_vec(),
            PPID_BINARY_EMPTY => vec![0],
            _ => message.into_bytes(),
        };

        self.inner.channel.notify(
            WorkerEvent::DataProducerSend,
            Some(self.inner.id.as_str()),
            NotificationBody::Message { ppid, data },
        );
        Ok(())
    }
}

impl fmt::Debug for DataProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProducer")
            .field("id", &self.inner.id)
            .field("data_type", &self.inner.data_type)
            .field("label", &self.inner.label)
            .field("closed", &self.closed())
            .finish()
    }
}
