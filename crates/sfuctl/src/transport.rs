use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sfuctl_channel::{Channel, ConsumeRequest, Event as WorkerEvent, Method, Notification, RequestBody, RequestError, ResponseBody};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::consumer::{Consumer, ConsumerOptions, ConsumerParams};
use crate::data::{json_data, AppData, ConsumerType, DataType, SctpParameters, TransportKind};
use crate::data_consumer::{DataConsumer, DataConsumerOptions, DataConsumerParams};
use crate::data_producer::{DataProducer, DataProducerOptions, DataProducerParams};
use crate::error::{Error, Result};
use crate::events::{Emitter, HandlerId, InternalEventKind};
use crate::negotiation::CapabilityNegotiator;
use crate::producer::{Producer, ProducerOptions, ProducerParams};
use crate::registry::Registry;
use crate::router::RouterShared;
use crate::sctp::SctpStreamIds;

/// MIDs are at most 8 characters long.
const MAX_MID: u32 = 100_000_000;

crate::events! {
    /// Events of a [`Transport`] for its owner.
    pub enum TransportEvent: TransportEventKind {
        /// The router closed and took the transport with it.
        RouterClose,
        Trace(Value),
        SctpStateChange(String),
    }
}

crate::events! {
    /// Events of a [`Transport`] for monitoring.
    pub enum TransportObserverEvent: TransportObserverEventKind {
        Close,
        NewProducer(Producer),
        NewConsumer(Consumer),
        NewDataProducer(DataProducer),
        NewDataConsumer(DataConsumer),
        Trace(Value),
    }
}

crate::events! {
    /// Signals from a transport to its router.
    pub(crate) enum TransportInternalEvent: TransportInternalEventKind {
        Close,
        NewProducer(Producer),
        ProducerClose(Producer),
        NewDataProducer(DataProducer),
        DataProducerClose(DataProducer),
    }
}

/// Options for the `create_*_transport` methods of a router.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Transport specific creation parameters, forwarded to the worker.
    pub params: Value,
    pub app_data: AppData,
}

impl TransportOptions {
    pub fn new(params: Value) -> Self {
        Self {
            params,
            app_data: AppData::new(),
        }
    }
}

/// Trace event types a transport can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportTraceEventType {
    Probation,
    Bwe,
}

#[derive(Deserialize, Default)]
struct ProduceResponse {
    #[serde(rename = "type", default)]
    producer_type: crate::data::ProducerType,
}

#[derive(Deserialize)]
struct SctpStateChange {
    #[serde(rename = "sctpState")]
    sctp_state: String,
}

pub(crate) struct TransportParams {
    pub id: String,
    pub kind: TransportKind,
    pub router: Arc<RouterShared>,
    pub channel: Channel,
    pub negotiator: Arc<dyn CapabilityNegotiator>,
    pub sctp_parameters: Option<SctpParameters>,
    pub data: Value,
    pub app_data: AppData,
}

struct State {
    producers: Registry<Producer>,
    consumers: Registry<Consumer>,
    data_producers: Registry<DataProducer>,
    data_consumers: Registry<DataConsumer>,
    cname_for_producers: Option<String>,
    next_mid: u32,
    sctp_stream_ids: Option<SctpStreamIds>,
}

struct Inner {
    id: String,
    kind: TransportKind,
    router: Arc<RouterShared>,
    channel: Channel,
    negotiator: Arc<dyn CapabilityNegotiator>,
    sctp_parameters: Option<SctpParameters>,
    data: Value,
    app_data: AppData,
    closed: AtomicBool,
    state: Mutex<State>,
    events: Emitter<TransportEvent>,
    observer: Emitter<TransportObserverEvent>,
    internal: Emitter<TransportInternalEvent>,
}

/// A network path between the router and an endpoint.
///
/// Owns the producers, consumers, data producers and data consumers created
/// on it. Closing the transport closes all of them first, in that order.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    pub(crate) fn new(params: TransportParams) -> Self {
        debug!(id = %params.id, kind = params.kind.as_str(), "constructor()");

        let transport = Self {
            inner: Arc::new(Inner {
                id: params.id,
                kind: params.kind,
                router: params.router,
                channel: params.channel,
                negotiator: params.negotiator,
                sctp_parameters: params.sctp_parameters,
                data: params.data,
                app_data: params.app_data,
                closed: AtomicBool::new(false),
                state: Mutex::new(State {
                    producers: Registry::default(),
                    consumers: Registry::default(),
                    data_producers: Registry::default(),
                    data_consumers: Registry::default(),
                    cname_for_producers: None,
                    next_mid: 0,
                    sctp_stream_ids: None,
                }),
                events: Emitter::new(),
                observer: Emitter::new(),
                internal: Emitter::new(),
            }),
        };
        transport.handle_worker_notifications();
        transport
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn router_id(&self) -> &str {
        &self.inner.router.id
    }

    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// SCTP association parameters, when SCTP is enabled.
    pub fn sctp_parameters(&self) -> Option<SctpParameters> {
        self.inner.sctp_parameters
    }

    /// Data returned by the worker when the transport was created.
    pub fn data(&self) -> &Value {
        &self.inner.data
    }

    pub fn producer(&self, id: &str) -> Option<Producer> {
        self.inner.state.lock().producers.get(id)
    }

    pub fn consumer(&self, id: &str) -> Option<Consumer> {
        self.inner.state.lock().consumers.get(id)
    }

    pub fn data_producer(&self, id: &str) -> Option<DataProducer> {
        self.inner.state.lock().data_producers.get(id)
    }

    pub fn data_consumer(&self, id: &str) -> Option<DataConsumer> {
        self.inner.state.lock().data_consumers.get(id)
    }

    pub fn producers(&self) -> Vec<Producer> {
        self.inner.state.lock().producers.values()
    }

    pub fn consumers(&self) -> Vec<Consumer> {
        self.inner.state.lock().consumers.values()
    }

    pub fn data_producers(&self) -> Vec<DataProducer> {
        self.inner.state.lock().data_producers.values()
    }

    pub fn data_consumers(&self) -> Vec<DataConsumer> {
        self.inner.state.lock().data_consumers.values()
    }

    pub fn on<F>(&self, kind: TransportEventKind, handler: F) -> HandlerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<TransportObserverEvent> {
        &self.inner.observer
    }

    pub(crate) fn internal(&self) -> &Emitter<TransportInternalEvent> {
        &self.inner.internal
    }

    /// Close the transport and everything created on it.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "close()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        let _ = self.inner.channel.request_binary(
            Method::RouterCloseTransport,
            Some(self.inner.router.id.as_str()),
            RequestBody::CloseTransport {
                transport_id: self.inner.id.clone(),
            },
        );

        self.close_children(true);

        self.inner.internal.emit(&TransportInternalEvent::Close);
        self.inner.observer.emit(&TransportObserverEvent::Close);
    }

    /// The owning router closed.
    pub(crate) fn router_closed(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "routerClosed()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        // The router already dropped its indexes.
        self.close_children(false);

        self.inner.events.emit(&TransportEvent::RouterClose);
        self.inner.observer.emit(&TransportObserverEvent::Close);
    }

    fn close_children(&self, notify_router: bool) {
        let (producers, consumers, data_producers, data_consumers) = {
            let mut state = self.inner.state.lock();
            (
                state.producers.take(),
                state.consumers.take(),
                state.data_producers.take(),
                state.data_consumers.take(),
            )
        };

        for producer in producers {
            producer.transport_closed();
            if notify_router {
                self.inner
                    .internal
                    .emit(&TransportInternalEvent::ProducerClose(producer));
            }
        }

        for consumer in consumers {
            consumer.transport_closed();
        }

        for data_producer in data_producers {
            data_producer.transport_closed();
            if notify_router {
                self.inner
                    .internal
                    .emit(&TransportInternalEvent::DataProducerClose(data_producer));
            }
        }

        for data_consumer in data_consumers {
            data_consumer.transport_closed();
        }
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "dump()");
        Ok(self
            .inner
            .channel
            .request(Method::TransportDump, Some(self.inner.id.as_str()), &())?
            .await?)
    }

    pub async fn get_stats(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "getStats()");
        Ok(self
            .inner
            .channel
            .request(Method::TransportGetStats, Some(self.inner.id.as_str()), &())?
            .await?)
    }

    /// Maximum incoming bitrate in bits per second.
    pub async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<()> {
        debug!(id = %self.inner.id, bitrate, "setMaxIncomingBitrate()");
        self.inner
            .channel
            .request(
                Method::TransportSetMaxIncomingBitrate,
                Some(self.inner.id.as_str()),
                &json!({ "bitrate": bitrate }),
            )?
            .await?;
        Ok(())
    }

    /// Maximum outgoing bitrate in bits per second.
    pub async fn set_max_outgoing_bitrate(&self, bitrate: u32) -> Result<()> {
        debug!(id = %self.inner.id, bitrate, "setMaxOutgoingBitrate()");
        self.inner
            .channel
            .request(
                Method::TransportSetMaxOutgoingBitrate,
                Some(self.inner.id.as_str()),
                &json!({ "bitrate": bitrate }),
            )?
            .await?;
        Ok(())
    }

    pub async fn enable_trace_event(&self, types: &[TransportTraceEventType]) -> Result<()> {
        debug!(id = %self.inner.id, "enableTraceEvent()");
        self.inner
            .channel
            .request(
                Method::TransportEnableTraceEvent,
                Some(self.inner.id.as_str()),
                &json!({ "types": types }),
            )?
            .await?;
        Ok(())
    }

    /// Create a producer.
    pub async fn produce(&self, options: ProducerOptions) -> Result<Producer> {
        debug!(id = %self.inner.id, "produce()");

        self.ensure_open()?;

        let ProducerOptions {
            id,
            kind,
            mut rtp_parameters,
            paused,
            key_frame_request_delay,
            app_data,
        } = options;

        if let Some(id) = &id {
            if self.inner.state.lock().producers.contains(id) {
                return Err(Error::invalid_argument(format!(
                    "a Producer with same id \"{id}\" already exists"
                )));
            }
        }

        self.inner.negotiator.validate_rtp_parameters(&rtp_parameters)?;

        ensure_encodings(&mut rtp_parameters);

        // Pipe transports keep the CNAME of each producer.
        if self.inner.kind != TransportKind::Pipe {
            self.apply_cname(&mut rtp_parameters);
        }

        let router_caps = &self.inner.router.rtp_capabilities;
        let rtp_mapping = self
            .inner
            .negotiator
            .producer_rtp_mapping(&rtp_parameters, router_caps)?;
        let consumable_rtp_parameters = self.inner.negotiator.consumable_rtp_parameters(
            kind,
            &rtp_parameters,
            router_caps,
            &rtp_mapping,
        )?;

        let producer_id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let request = json!({
            "producerId": producer_id,
            "kind": kind,
            "rtpParameters": rtp_parameters,
            "rtpMapping": rtp_mapping,
            "keyFrameRequestDelay": key_frame_request_delay,
            "paused": paused,
        });
        let status = self
            .inner
            .channel
            .request(Method::TransportProduce, Some(self.inner.id.as_str()), &request)?
            .await?;
        let status = serde_json::from_value::<Option<ProduceResponse>>(status)?.unwrap_or_default();

        let producer = Producer::new(ProducerParams {
            id: producer_id.clone(),
            transport_id: self.inner.id.clone(),
            kind,
            rtp_parameters,
            producer_type: status.producer_type,
            consumable_rtp_parameters,
            paused,
            app_data,
            channel: self.inner.channel.clone(),
        });

        if self.closed() {
            producer.transport_closed();
            return Err(Error::InvalidState("transport closed"));
        }

        self.inner
            .state
            .lock()
            .producers
            .insert(producer_id.clone(), producer.clone());

        let weak = Arc::downgrade(&self.inner);
        producer.internal().on(InternalEventKind::Close, move |_| {
            let Some(inner) = weak.upgrade() else { return };
            let removed = inner.state.lock().producers.remove(&producer_id);
            if let Some(producer) = removed {
                inner
                    .internal
                    .emit(&TransportInternalEvent::ProducerClose(producer));
            }
        });

        self.inner
            .internal
            .emit(&TransportInternalEvent::NewProducer(producer.clone()));
        self.inner
            .observer
            .emit(&TransportObserverEvent::NewProducer(producer.clone()));

        Ok(producer)
    }

    /// Create a consumer of a producer in the same router.
    pub async fn consume(&self, options: ConsumerOptions) -> Result<Consumer> {
        debug!(id = %self.inner.id, "consume()");

        self.ensure_open()?;

        let ConsumerOptions {
            producer_id,
            rtp_capabilities,
            paused,
            mid,
            preferred_layers,
            ignore_dtx,
            pipe,
            app_data,
        } = options;

        if producer_id.is_empty() {
            return Err(Error::invalid_argument("missing producerId"));
        }
        if mid.as_deref() == Some("") {
            return Err(Error::invalid_argument("if given, mid must be non empty string"));
        }

        self.inner.negotiator.validate_rtp_capabilities(&rtp_capabilities)?;

        let producer = self
            .inner
            .router
            .producer(&producer_id)
            .ok_or_else(|| Error::NotFound {
                kind: "Producer",
                id: producer_id.clone(),
            })?;

        let mut rtp_parameters = self.inner.negotiator.consumer_rtp_parameters(
            producer.consumable_rtp_parameters(),
            &rtp_capabilities,
            pipe,
        )?;

        if !pipe {
            let mid = match mid {
                Some(mid) => mid,
                None => self.next_mid(),
            };
            if let Some(params) = rtp_parameters.as_object_mut() {
                params.insert("mid".into(), Value::String(mid));
            }
        }

        let consumer_id = Uuid::new_v4().to_string();

        let body = RequestBody::Consume(ConsumeRequest {
            consumer_id: consumer_id.clone(),
            producer_id: producer_id.clone(),
            kind: producer.kind(),
            rtp_parameters: serde_json::to_vec(&rtp_parameters)?,
            paused,
            preferred_layers,
            ignore_dtx,
            pipe,
        });
        let response = self
            .inner
            .channel
            .request_binary(Method::TransportConsume, Some(self.inner.id.as_str()), body)?
            .await?;
        let ResponseBody::Consume(status) = response else {
            return Err(RequestError::UnexpectedResponse.into());
        };

        let consumer = Consumer::new(ConsumerParams {
            id: consumer_id.clone(),
            producer_id,
            transport_id: self.inner.id.clone(),
            kind: producer.kind(),
            rtp_parameters,
            consumer_type: ConsumerType::for_producer(producer.producer_type(), pipe),
            paused: status.paused,
            producer_paused: status.producer_paused,
            score: status.score.unwrap_or_default(),
            preferred_layers: status.preferred_layers,
            app_data,
            channel: self.inner.channel.clone(),
        });

        if self.closed() {
            consumer.transport_closed();
            return Err(Error::InvalidState("transport closed"));
        }

        self.inner
            .state
            .lock()
            .consumers
            .insert(consumer_id.clone(), consumer.clone());

        for kind in [InternalEventKind::Close, InternalEventKind::UpstreamClose] {
            let weak = Arc::downgrade(&self.inner);
            let consumer_id = consumer_id.clone();
            consumer.internal().on(kind, move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.state.lock().consumers.remove(&consumer_id);
                }
            });
        }

        self.inner
            .observer
            .emit(&TransportObserverEvent::NewConsumer(consumer.clone()));

        Ok(consumer)
    }

    /// Create a data producer.
    pub async fn produce_data(&self, options: DataProducerOptions) -> Result<DataProducer> {
        debug!(id = %self.inner.id, "produceData()");

        self.ensure_open()?;

        let DataProducerOptions {
            id,
            sctp_stream_parameters,
            label,
            protocol,
            app_data,
        } = options;

        if let Some(id) = &id {
            if self.inner.state.lock().data_producers.contains(id) {
                return Err(Error::invalid_argument(format!(
                    "a DataProducer with same id \"{id}\" already exists"
                )));
            }
        }

        let (data_type, sctp_stream_parameters) = if self.inner.kind == TransportKind::Direct {
            if sctp_stream_parameters.is_some() {
                warn!(
                    id = %self.inner.id,
                    "produceData() | sctpStreamParameters are ignored when producing data on a DirectTransport"
                );
            }
            (DataType::Direct, None)
        } else {
            let params = sctp_stream_parameters
                .ok_or_else(|| Error::invalid_argument("missing sctpStreamParameters"))?;
            self.inner.negotiator.validate_sctp_stream_parameters(&params)?;
            (DataType::Sctp, Some(params))
        };

        let data_producer_id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let request = json!({
            "dataProducerId": data_producer_id,
            "type": data_type,
            "sctpStreamParameters": sctp_stream_parameters,
            "label": label,
            "protocol": protocol,
        });
        self.inner
            .channel
            .request(Method::TransportProduceData, Some(self.inner.id.as_str()), &request)?
            .await?;

        let data_producer = DataProducer::new(DataProducerParams {
            id: data_producer_id.clone(),
            transport_id: self.inner.id.clone(),
            data_type,
            sctp_stream_parameters,
            label,
            protocol,
            app_data,
            channel: self.inner.channel.clone(),
        });

        if self.closed() {
            data_producer.transport_closed();
            return Err(Error::InvalidState("transport closed"));
        }

        self.inner
            .state
            .lock()
            .data_producers
            .insert(data_producer_id.clone(), data_producer.clone());

        let weak = Arc::downgrade(&self.inner);
        data_producer.internal().on(InternalEventKind::Close, move |_| {
            let Some(inner) = weak.upgrade() else { return };
            let removed = inner.state.lock().data_producers.remove(&data_producer_id);
            if let Some(data_producer) = removed {
                inner
                    .internal
                    .emit(&TransportInternalEvent::DataProducerClose(data_producer));
            }
        });

        self.inner
            .internal
            .emit(&TransportInternalEvent::NewDataProducer(data_producer.clone()));
        self.inner
            .observer
            .emit(&TransportObserverEvent::NewDataProducer(data_producer.clone()));

        Ok(data_producer)
    }

    /// Create a data consumer of a data producer in the same router.
    ///
    /// On SCTP transports a stream id is reserved before the request is sent.
    /// It is released when the request fails and when the data consumer
    /// closes for any reason.
    pub async fn consume_data(&self, options: DataConsumerOptions) -> Result<DataConsumer> {
        debug!(id = %self.inner.id, "consumeData()");

        self.ensure_open()?;

        let DataConsumerOptions {
            data_producer_id,
            ordered,
            max_packet_life_time,
            max_retransmits,
            app_data,
        } = options;

        if data_producer_id.is_empty() {
            return Err(Error::invalid_argument("missing dataProducerId"));
        }

        let data_producer = self
            .inner
            .router
            .data_producer(&data_producer_id)
            .ok_or_else(|| Error::NotFound {
                kind: "DataProducer",
                id: data_producer_id.clone(),
            })?;

        let (data_type, sctp_stream_parameters) = if self.inner.kind == TransportKind::Direct {
            if ordered.is_some() || max_packet_life_time.is_some() || max_retransmits.is_some() {
                warn!(
                    id = %self.inner.id,
                    "consumeData() | ordered, maxPacketLifeTime and maxRetransmits are ignored when consuming data on a DirectTransport"
                );
            }
            (DataType::Direct, None)
        } else {
            let mut params = data_producer.sctp_stream_parameters().unwrap_or_default();
            if ordered.is_some() {
                params.ordered = ordered;
            }
            if max_packet_life_time.is_some() {
                params.max_packet_life_time = max_packet_life_time;
            }
            if max_retransmits.is_some() {
                params.max_retransmits = max_retransmits;
            }
            params.stream_id = self.allocate_sctp_stream_id()?;
            (DataType::Sctp, Some(params))
        };
        let stream_id = sctp_stream_parameters.map(|params| params.stream_id);

        let data_consumer_id = Uuid::new_v4().to_string();

        let request = json!({
            "dataConsumerId": data_consumer_id,
            "dataProducerId": data_producer_id,
            "type": data_type,
            "sctpStreamParameters": sctp_stream_parameters,
            "label": data_producer.label(),
            "protocol": data_producer.protocol(),
        });
        let response = match self.inner.channel.request(
            Method::TransportConsumeData,
            Some(self.inner.id.as_str()),
            &request,
        ) {
            Ok(pending) => pending.await,
            Err(err) => Err(err),
        };
        if let Err(err) = response {
            if let Some(stream_id) = stream_id {
                release_sctp_stream_id(&self.inner, stream_id);
            }
            return Err(err.into());
        }

        let data_consumer = DataConsumer::new(DataConsumerParams {
            id: data_consumer_id.clone(),
            data_producer_id,
            transport_id: self.inner.id.clone(),
            data_type,
            sctp_stream_parameters,
            label: data_producer.label().to_owned(),
            protocol: data_producer.protocol().to_owned(),
            app_data,
            channel: self.inner.channel.clone(),
        });

        if self.closed() {
            data_consumer.transport_closed();
            return Err(Error::InvalidState("transport closed"));
        }

        self.inner
            .state
            .lock()
            .data_consumers
            .insert(data_consumer_id.clone(), data_consumer.clone());

        for kind in [InternalEventKind::Close, InternalEventKind::UpstreamClose] {
            let weak = Arc::downgrade(&self.inner);
            let data_consumer_id = data_consumer_id.clone();
            data_consumer.internal().on(kind, move |_| {
                let Some(inner) = weak.upgrade() else { return };
                inner.state.lock().data_consumers.remove(&data_consumer_id);
                if let Some(stream_id) = stream_id {
                    release_sctp_stream_id(&inner, stream_id);
                }
            });
        }

        self.inner
            .observer
            .emit(&TransportObserverEvent::NewDataConsumer(data_consumer.clone()));

        Ok(data_consumer)
    }

    /// SCTP stream ids currently reserved by data consumers.
    pub fn sctp_stream_ids_in_use(&self) -> usize {
        self.inner
            .state
            .lock()
            .sctp_stream_ids
            .as_ref()
            .map_or(0, SctpStreamIds::in_use)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed() {
            Err(Error::InvalidState("transport closed"))
        } else {
            Ok(())
        }
    }

    fn allocate_sctp_stream_id(&self) -> Result<u16> {
        let mis = self
            .inner
            .sctp_parameters
            .map(|params| params.mis)
            .ok_or_else(|| Error::invalid_argument("missing sctpParameters.MIS"))?;

        self.inner
            .state
            .lock()
            .sctp_stream_ids
            .get_or_insert_with(|| SctpStreamIds::new(mis))
            .allocate()
    }

    fn next_mid(&self) -> String {
        let mut state = self.inner.state.lock();
        let mid = state.next_mid;
        state.next_mid += 1;
        if state.next_mid == MAX_MID {
            error!(id = %self.inner.id, "consume() | reaching max MID value \"{}\"", state.next_mid);
            state.next_mid = 0;
        }
        mid.to_string()
    }

    /// Write the transport-wide CNAME into `rtpParameters.rtcp.cname`.
    ///
    /// The first CNAME seen becomes the transport-wide one. Without any, a
    /// random 8-character one is generated.
    fn apply_cname(&self, rtp_parameters: &mut Value) {
        let given = rtp_parameters
            .pointer("/rtcp/cname")
            .and_then(Value::as_str)
            .filter(|cname| !cname.is_empty())
            .map(str::to_owned);

        let cname = self
            .inner
            .state
            .lock()
            .cname_for_producers
            .get_or_insert_with(|| given.unwrap_or_else(|| Uuid::new_v4().to_string()[..8].to_owned()))
            .clone();

        let Some(params) = rtp_parameters.as_object_mut() else {
            return;
        };
        let rtcp = params.entry("rtcp").or_insert_with(|| json!({}));
        if !rtcp.is_object() {
            *rtcp = json!({});
        }
        if let Some(rtcp) = rtcp.as_object_mut() {
            rtcp.insert("cname".into(), Value::String(cname));
        }
    }

    fn handle_worker_notifications(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.channel.subscribe(&self.inner.id, move |notification| {
            if let Some(inner) = weak.upgrade() {
                on_notification(&inner, notification);
            }
        });
    }
}

fn on_notification(inner: &Inner, notification: &Notification) {
    match notification.event {
        WorkerEvent::Trace => {
            let trace = json_data::<Value>(&notification.data).unwrap_or(Value::Null);
            inner.events.emit(&TransportEvent::Trace(trace.clone()));
            inner.observer.emit(&TransportObserverEvent::Trace(trace));
        }
        WorkerEvent::SctpStateChange => {
            if let Some(change) = json_data::<SctpStateChange>(&notification.data) {
                inner
                    .events
                    .emit(&TransportEvent::SctpStateChange(change.sctp_state));
            }
        }
        other => debug!(id = %inner.id, event = %other, "ignoring unknown event"),
    }
}

fn release_sctp_stream_id(inner: &Inner, stream_id: u16) {
    if let Some(ids) = inner.state.lock().sctp_stream_ids.as_mut() {
        ids.release(stream_id);
    }
}

/// Missing or empty `encodings` become a single empty encoding.
fn ensure_encodings(rtp_parameters: &mut Value) {
    let Some(params) = rtp_parameters.as_object_mut() else {
        return;
    };
    let empty = match params.get("encodings") {
        Some(Value::Array(encodings)) => encodings.is_empty(),
        _ => true,
    };
    if empty {
        params.insert("encodings".into(), json!([{}]));
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("closed", &self.closed())
            .finish()
    }
}
