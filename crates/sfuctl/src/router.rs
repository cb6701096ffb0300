use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sfuctl_channel::{Channel, Method, RequestBody};
use tracing::debug;
use uuid::Uuid;

use crate::data::{AppData, SctpParameters, TransportKind};
use crate::data_producer::DataProducer;
use crate::error::{Error, Result};
use crate::events::{Emitter, HandlerId, InternalEvent};
use crate::negotiation::CapabilityNegotiator;
use crate::producer::Producer;
use crate::registry::Registry;
use crate::transport::{
    Transport, TransportInternalEvent, TransportInternalEventKind, TransportOptions, TransportParams,
};

crate::events! {
    /// Events of a [`Router`] for its owner.
    pub enum RouterEvent: RouterEventKind {
        /// The worker closed and took the router with it.
        WorkerClose,
    }
}

crate::events! {
    /// Events of a [`Router`] for monitoring.
    pub enum RouterObserverEvent: RouterObserverEventKind {
        Close,
        NewTransport(Transport),
    }
}

/// Options for [`Worker::create_router`](crate::Worker::create_router).
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Media codecs the router supports.
    pub media_codecs: Vec<Value>,
    pub app_data: AppData,
}

impl RouterOptions {
    pub fn new(media_codecs: Vec<Value>) -> Self {
        Self {
            media_codecs,
            app_data: AppData::new(),
        }
    }
}

/// Router state visible to its transports.
pub(crate) struct RouterShared {
    pub id: String,
    pub rtp_capabilities: Value,
    producers: Mutex<Registry<Producer>>,
    data_producers: Mutex<Registry<DataProducer>>,
}

impl RouterShared {
    pub fn producer(&self, id: &str) -> Option<Producer> {
        self.producers.lock().get(id)
    }

    pub fn data_producer(&self, id: &str) -> Option<DataProducer> {
        self.data_producers.lock().get(id)
    }
}

pub(crate) struct RouterParams {
    pub id: String,
    pub rtp_capabilities: Value,
    pub channel: Channel,
    pub negotiator: Arc<dyn CapabilityNegotiator>,
    pub app_data: AppData,
}

struct Inner {
    shared: Arc<RouterShared>,
    channel: Channel,
    negotiator: Arc<dyn CapabilityNegotiator>,
    app_data: AppData,
    closed: AtomicBool,
    transports: Mutex<Registry<Transport>>,
    events: Emitter<RouterEvent>,
    observer: Emitter<RouterObserverEvent>,
    internal: Emitter<InternalEvent>,
}

impl Inner {
    fn on_transport_event(&self, transport_id: &str, event: &TransportInternalEvent) {
        match event {
            TransportInternalEvent::Close => {
                self.transports.lock().remove(transport_id);
            }
            TransportInternalEvent::NewProducer(producer) => {
                self.shared
                    .producers
                    .lock()
                    .insert(producer.id().to_owned(), producer.clone());
            }
            TransportInternalEvent::ProducerClose(producer) => {
                self.shared.producers.lock().remove(producer.id());
            }
            TransportInternalEvent::NewDataProducer(data_producer) => {
                self.shared
                    .data_producers
                    .lock()
                    .insert(data_producer.id().to_owned(), data_producer.clone());
            }
            TransportInternalEvent::DataProducerClose(data_producer) => {
                self.shared.data_producers.lock().remove(data_producer.id());
            }
        }
    }
}

/// A media routing context. Producers and consumers created on transports of
/// the same router can be connected.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

impl Router {
    pub(crate) fn new(params: RouterParams) -> Self {
        debug!(id = %params.id, "constructor()");

        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(RouterShared {
                    id: params.id,
                    rtp_capabilities: params.rtp_capabilities,
                    producers: Mutex::new(Registry::default()),
                    data_producers: Mutex::new(Registry::default()),
                }),
                channel: params.channel,
                negotiator: params.negotiator,
                app_data: params.app_data,
                closed: AtomicBool::new(false),
                transports: Mutex::new(Registry::default()),
                events: Emitter::new(),
                observer: Emitter::new(),
                internal: Emitter::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.shared.id
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// RTP capabilities computed from the router's media codecs.
    pub fn rtp_capabilities(&self) -> &Value {
        &self.inner.shared.rtp_capabilities
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    pub fn transport(&self, id: &str) -> Option<Transport> {
        self.inner.transports.lock().get(id)
    }

    pub fn transports(&self) -> Vec<Transport> {
        self.inner.transports.lock().values()
    }

    /// A live producer on any transport of this router.
    pub fn producer(&self, id: &str) -> Option<Producer> {
        self.inner.shared.producer(id)
    }

    /// A live data producer on any transport of this router.
    pub fn data_producer(&self, id: &str) -> Option<DataProducer> {
        self.inner.shared.data_producer(id)
    }

    pub fn on<F>(&self, kind: RouterEventKind, handler: F) -> HandlerId
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<RouterObserverEvent> {
        &self.inner.observer
    }

    pub(crate) fn internal(&self) -> &Emitter<InternalEvent> {
        &self.inner.internal
    }

    /// Close the router and every transport on it.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.id(), "close()");

        let _ = self.inner.channel.request_binary(
            Method::WorkerCloseRouter,
            None,
            RequestBody::CloseRouter {
                router_id: self.id().to_owned(),
            },
        );

        self.close_transports();

        self.inner.internal.emit(&InternalEvent::Close);
        self.inner.observer.emit(&RouterObserverEvent::Close);
    }

    /// The owning worker closed.
    pub(crate) fn worker_closed(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.id(), "workerClosed()");

        self.close_transports();

        self.inner.events.emit(&RouterEvent::WorkerClose);
        self.inner.observer.emit(&RouterObserverEvent::Close);
    }

    fn close_transports(&self) {
        let transports = self.inner.transports.lock().take();
        for transport in transports {
            transport.router_closed();
        }

        self.inner.shared.producers.lock().take();
        self.inner.shared.data_producers.lock().take();
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(id = %self.id(), "dump()");
        Ok(self
            .inner
            .channel
            .request(Method::RouterDump, Some(self.id()), &())?
            .await?)
    }

    pub async fn create_webrtc_transport(&self, options: TransportOptions) -> Result<Transport> {
        self.create_transport(TransportKind::WebRtc, options).await
    }

    pub async fn create_plain_transport(&self, options: TransportOptions) -> Result<Transport> {
        self.create_transport(TransportKind::Plain, options).await
    }

    pub async fn create_pipe_transport(&self, options: TransportOptions) -> Result<Transport> {
        self.create_transport(TransportKind::Pipe, options).await
    }

    pub async fn create_direct_transport(&self, options: TransportOptions) -> Result<Transport> {
        self.create_transport(TransportKind::Direct, options).await
    }

    async fn create_transport(&self, kind: TransportKind, options: TransportOptions) -> Result<Transport> {
        debug!(id = %self.id(), kind = kind.as_str(), "createTransport()");

        if self.closed() {
            return Err(Error::InvalidState("router closed"));
        }

        let TransportOptions { params, app_data } = options;

        let mut request = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(Error::invalid_argument("transport params must be an object")),
        };
        let transport_id = Uuid::new_v4().to_string();
        request.insert("transportId".into(), Value::String(transport_id.clone()));

        let method = match kind {
            TransportKind::WebRtc => Method::RouterCreateWebRtcTransport,
            TransportKind::Plain => Method::RouterCreatePlainTransport,
            TransportKind::Pipe => Method::RouterCreatePipeTransport,
            TransportKind::Direct => Method::RouterCreateDirectTransport,
        };

        let data = self
            .inner
            .channel
            .request(method, Some(self.id()), &Value::Object(request))?
            .await?;

        let sctp_parameters = match data.get("sctpParameters") {
            None | Some(Value::Null) => None,
            Some(params) => Some(serde_json::from_value::<SctpParameters>(params.clone())?),
        };

        let transport = Transport::new(TransportParams {
            id: transport_id.clone(),
            kind,
            router: Arc::clone(&self.inner.shared),
            channel: self.inner.channel.clone(),
            negotiator: Arc::clone(&self.inner.negotiator),
            sctp_parameters,
            data,
            app_data,
        });

        if self.closed() {
            transport.router_closed();
            return Err(Error::InvalidState("router closed"));
        }

        self.inner
            .transports
            .lock()
            .insert(transport_id.clone(), transport.clone());

        for kind in [
            TransportInternalEventKind::Close,
            TransportInternalEventKind::NewProducer,
            TransportInternalEventKind::ProducerClose,
            TransportInternalEventKind::NewDataProducer,
            TransportInternalEventKind::DataProducerClose,
        ] {
            let weak = Arc::downgrade(&self.inner);
            let transport_id = transport_id.clone();
            transport.internal().on(kind, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_transport_event(&transport_id, event);
                }
            });
        }

        self.inner
            .observer
            .emit(&RouterObserverEvent::NewTransport(transport.clone()));

        Ok(transport)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.shared.id)
            .field("closed", &self.closed())
            .finish()
    }
}
