use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sfuctl_channel::{Channel, Event as WorkerEvent, Method, Notification, NotificationBody, NotificationData, RequestBody};
use tracing::debug;

use crate::data::{json_data, AppData, ConsumerLayers, ConsumerScore, ConsumerType, MediaKind};
use crate::error::Result;
use crate::events::{Emitter, HandlerId, InternalEvent};

crate::events! {
    /// Events of a [`Consumer`] for its owner.
    pub enum ConsumerEvent: ConsumerEventKind {
        TransportClose,
        /// The producer being consumed closed, and so did the consumer.
        ProducerClose,
        ProducerPause,
        ProducerResume,
        Score(ConsumerScore),
        LayersChange(Option<ConsumerLayers>),
        Trace(Value),
    }
}

crate::events! {
    /// Events of a [`Consumer`] for monitoring.
    pub enum ConsumerObserverEvent: ConsumerObserverEventKind {
        Close,
        Pause,
        Resume,
        Score(ConsumerScore),
        LayersChange(Option<ConsumerLayers>),
        Trace(Value),
    }
}

/// Options for [`Transport::consume`](crate::Transport::consume).
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub producer_id: String,
    /// RTP capabilities of the consuming endpoint.
    pub rtp_capabilities: Value,
    pub paused: bool,
    /// MID for the consumer. Assigned by the transport when absent.
    pub mid: Option<String>,
    pub preferred_layers: Option<ConsumerLayers>,
    pub ignore_dtx: bool,
    /// Consume through a pipe transport, keeping the producer's parameters.
    pub pipe: bool,
    pub app_data: AppData,
}

impl ConsumerOptions {
    pub fn new(producer_id: impl Into<String>, rtp_capabilities: Value) -> Self {
        Self {
            producer_id: producer_id.into(),
            rtp_capabilities,
            paused: false,
            mid: None,
            preferred_layers: None,
            ignore_dtx: false,
            pipe: false,
            app_data: AppData::new(),
        }
    }
}

pub(crate) struct ConsumerParams {
    pub id: String,
    pub producer_id: String,
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    pub consumer_type: ConsumerType,
    pub paused: bool,
    pub producer_paused: bool,
    pub score: ConsumerScore,
    pub preferred_layers: Option<ConsumerLayers>,
    pub app_data: AppData,
    pub channel: Channel,
}

struct State {
    paused: bool,
    producer_paused: bool,
    score: ConsumerScore,
    preferred_layers: Option<ConsumerLayers>,
    current_layers: Option<ConsumerLayers>,
}

struct Inner {
    id: String,
    producer_id: String,
    transport_id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    consumer_type: ConsumerType,
    app_data: AppData,
    channel: Channel,
    closed: AtomicBool,
    state: Mutex<State>,
    events: Emitter<ConsumerEvent>,
    observer: Emitter<ConsumerObserverEvent>,
    internal: Emitter<InternalEvent>,
}

/// Forwards the media of one producer to an endpoint.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<Inner>,
}

impl Consumer {
    pub(crate) fn new(params: ConsumerParams) -> Self {
        debug!(id = %params.id, "constructor()");

        let consumer = Self {
            inner: Arc::new(Inner {
                id: params.id,
                producer_id: params.producer_id,
                transport_id: params.transport_id,
                kind: params.kind,
                rtp_parameters: params.rtp_parameters,
                consumer_type: params.consumer_type,
                app_data: params.app_data,
                channel: params.channel,
                closed: AtomicBool::new(false),
                state: Mutex::new(State {
                    paused: params.paused,
                    producer_paused: params.producer_paused,
                    score: params.score,
                    preferred_layers: params.preferred_layers,
                    current_layers: None,
                }),
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

    pub fn producer_id(&self) -> &str {
        &self.inner.producer_id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn rtp_parameters(&self) -> &Value {
        &self.inner.rtp_parameters
    }

    pub fn consumer_type(&self) -> ConsumerType {
        self.inner.consumer_type
    }

    /// Paused locally.
    pub fn paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// The associated producer is paused.
    pub fn producer_paused(&self) -> bool {
        self.inner.state.lock().producer_paused
    }

    pub fn score(&self) -> ConsumerScore {
        self.inner.state.lock().score.clone()
    }

    pub fn preferred_layers(&self) -> Option<ConsumerLayers> {
        self.inner.state.lock().preferred_layers
    }

    pub fn current_layers(&self) -> Option<ConsumerLayers> {
        self.inner.state.lock().current_layers
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn on<F>(&self, kind: ConsumerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&ConsumerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<ConsumerObserverEvent> {
        &self.inner.observer
    }

    pub(crate) fn internal(&self) -> &Emitter<InternalEvent> {
        &self.inner.internal
    }

    /// Close the consumer.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "close()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        let _ = self.inner.channel.request_binary(
            Method::TransportCloseConsumer,
            Some(self.inner.transport_id.as_str()),
            RequestBody::CloseConsumer {
                consumer_id: self.inner.id.clone(),
            },
        );

        self.inner.internal.emit(&InternalEvent::Close);
        self.inner.observer.emit(&ConsumerObserverEvent::Close);
    }

    /// The owning transport closed.
    pub(crate) fn transport_closed(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "transportClosed()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        self.inner.events.emit(&ConsumerEvent::TransportClose);
        self.inner.observer.emit(&ConsumerObserverEvent::Close);
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "dump()");
        Ok(self
            .inner
            .channel
            .request(Method::ConsumerDump, Some(self.inner.id.as_str()), &())?
            .await?)
    }

    pub async fn get_stats(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "getStats()");
        Ok(self
            .inner
            .channel
            .request(Method::ConsumerGetStats, Some(self.inner.id.as_str()), &())?
            .await?)
    }

    pub async fn pause(&self) -> Result<()> {
        debug!(id = %self.inner.id, "pause()");

        let was_paused = {
            let state = self.inner.state.lock();
            state.paused || state.producer_paused
        };

        self.inner
            .channel
            .request(Method::ConsumerPause, Some(self.inner.id.as_str()), &())?
            .await?;

        self.inner.state.lock().paused = true;
        if !was_paused {
            self.inner.observer.emit(&ConsumerObserverEvent::Pause);
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        debug!(id = %self.inner.id, "resume()");

        let was_paused = {
            let state = self.inner.state.lock();
            state.paused || state.producer_paused
        };

        self.inner
            .channel
            .request(Method::ConsumerResume, Some(self.inner.id.as_str()), &())?
            .await?;

        let producer_paused = {
            let mut state = self.inner.state.lock();
            state.paused = false;
            state.producer_paused
        };
        if was_paused && !producer_paused {
            self.inner.observer.emit(&ConsumerObserverEvent::Resume);
        }
        Ok(())
    }

    pub async fn request_key_frame(&self) -> Result<()> {
        debug!(id = %self.inner.id, "requestKeyFrame()");

        self.inner
            .channel
            .request(Method::ConsumerRequestKeyFrame, Some(self.inner.id.as_str()), &())?
            .await?;
        Ok(())
    }

    fn handle_worker_notifications(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.channel.subscribe(&self.inner.id, move |notification| {
            if let Some(inner) = weak.upgrade() {
                Consumer { inner }.on_notification(notification);
            }
        });
    }

    fn on_notification(&self, notification: &Notification) {
        let inner = &self.inner;
        match notification.event {
            WorkerEvent::ProducerClose => {
                if inner.closed.swap(true, Ordering::SeqCst) {
                    return;
                }

                inner.channel.unsubscribe_all(&inner.id);

                inner.internal.emit(&InternalEvent::UpstreamClose);
                inner.events.emit(&ConsumerEvent::ProducerClose);
                inner.observer.emit(&ConsumerObserverEvent::Close);
            }
            WorkerEvent::ProducerPause => {
                let paused = {
                    let mut state = inner.state.lock();
                    if state.producer_paused {
                        return;
                    }
                    state.producer_paused = true;
                    state.paused
                };

                inner.events.emit(&ConsumerEvent::ProducerPause);
                if !paused {
                    inner.observer.emit(&ConsumerObserverEvent::Pause);
                }
            }
            WorkerEvent::ProducerResume => {
                let paused = {
                    let mut state = inner.state.lock();
                    if !state.producer_paused {
                        return;
                    }
                    state.producer_paused = false;
                    state.paused
                };

                inner.events.emit(&ConsumerEvent::ProducerResume);
                if !paused {
                    inner.observer.emit(&ConsumerObserverEvent::Resume);
                }
            }
            WorkerEvent::Score => {
                let score = match &notification.data {
                    NotificationData::Binary(NotificationBody::ConsumerScore(score)) => {
                        Some(score.clone())
                    }
                    data => json_data::<ConsumerScore>(data),
                };
                let Some(score) = score else { return };
                inner.state.lock().score = score.clone();
                inner.events.emit(&ConsumerEvent::Score(score.clone()));
                inner.observer.emit(&ConsumerObserverEvent::Score(score));
            }
            WorkerEvent::LayersChange => {
                let layers = match &notification.data {
                    NotificationData::Binary(NotificationBody::ConsumerLayers(layers)) => *layers,
                    data => json_data::<Option<ConsumerLayers>>(data).flatten(),
                };
                inner.state.lock().current_layers = layers;
                inner.events.emit(&ConsumerEvent::LayersChange(layers));
                inner.observer.emit(&ConsumerObserverEvent::LayersChange(layers));
            }
            WorkerEvent::Trace => {
                let trace = json_data::<Value>(&notification.data).unwrap_or(Value::Null);
                inner.events.emit(&ConsumerEvent::Trace(trace.clone()));
                inner.observer.emit(&ConsumerObserverEvent::Trace(trace));
            }
            other => debug!(id = %inner.id, event = %other, "ignoring unknown event"),
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.inner.id)
            .field("producer_id", &self.inner.producer_id)
            .field("kind", &self.inner.kind)
            .field("closed", &self.closed())
            .finish()
    }
}
