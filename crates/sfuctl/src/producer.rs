use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sfuctl_channel::{Channel, Event as WorkerEvent, Method, Notification, NotificationBody, NotificationData, RequestBody};
use tracing::debug;

use crate::data::{json_data, AppData, MediaKind, ProducerScore, ProducerType, VideoOrientation};
use crate::error::Result;
use crate::events::{Emitter, HandlerId, InternalEvent};

crate::events! {
    /// Events of a [`Producer`] for its owner.
    pub enum ProducerEvent: ProducerEventKind {
        /// The transport closed and took the producer with it.
        TransportClose,
        Score(Vec<ProducerScore>),
        VideoOrientationChange(VideoOrientation),
        Trace(Value),
    }
}

crate::events! {
    /// Events of a [`Producer`] for monitoring.
    pub enum ProducerObserverEvent: ProducerObserverEventKind {
        Close,
        Pause,
        Resume,
        Score(Vec<ProducerScore>),
        VideoOrientationChange(VideoOrientation),
        Trace(Value),
    }
}

/// Options for [`Transport::produce`](crate::Transport::produce).
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Producer id. A random one is generated when absent.
    pub id: Option<String>,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    pub paused: bool,
    /// Delay in milliseconds before forwarding a key frame request upstream.
    pub key_frame_request_delay: u32,
    pub app_data: AppData,
}

impl ProducerOptions {
    pub fn new(kind: MediaKind, rtp_parameters: Value) -> Self {
        Self {
            id: None,
            kind,
            rtp_parameters,
            paused: false,
            key_frame_request_delay: 0,
            app_data: AppData::new(),
        }
    }
}

pub(crate) struct ProducerParams {
    pub id: String,
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    pub producer_type: ProducerType,
    pub consumable_rtp_parameters: Value,
    pub paused: bool,
    pub app_data: AppData,
    pub channel: Channel,
}

struct State {
    paused: bool,
    score: Vec<ProducerScore>,
}

struct Inner {
    id: String,
    transport_id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    producer_type: ProducerType,
    consumable_rtp_parameters: Value,
    app_data: AppData,
    channel: Channel,
    closed: AtomicBool,
    state: Mutex<State>,
    events: Emitter<ProducerEvent>,
    observer: Emitter<ProducerObserverEvent>,
    internal: Emitter<InternalEvent>,
}

/// A media source injected into a router through a transport.
#[derive(Clone)]
pub struct Producer {
    inner: Arc<Inner>,
}

impl Producer {
    pub(crate) fn new(params: ProducerParams) -> Self {
        debug!(id = %params.id, "constructor()");

        let producer = Self {
            inner: Arc::new(Inner {
                id: params.id,
                transport_id: params.transport_id,
                kind: params.kind,
                rtp_parameters: params.rtp_parameters,
                producer_type: params.producer_type,
                consumable_rtp_parameters: params.consumable_rtp_parameters,
                app_data: params.app_data,
                channel: params.channel,
                closed: AtomicBool::new(false),
                state: Mutex::new(State {
                    paused: params.paused,
                    score: Vec::new(),
                }),
                events: Emitter::new(),
                observer: Emitter::new(),
                internal: Emitter::new(),
            }),
        };
        producer.handle_worker_notifications();
        producer
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn rtp_parameters(&self) -> &Value {
        &self.inner.rtp_parameters
    }

    pub fn producer_type(&self) -> ProducerType {
        self.inner.producer_type
    }

    /// RTP parameters consumers of this producer are derived from.
    pub fn consumable_rtp_parameters(&self) -> &Value {
        &self.inner.consumable_rtp_parameters
    }

    pub fn paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Latest score per encoding.
    pub fn score(&self) -> Vec<ProducerScore> {
        self.inner.state.lock().score.clone()
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn on<F>(&self, kind: ProducerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&ProducerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<ProducerObserverEvent> {
        &self.inner.observer
    }

    pub(crate) fn internal(&self) -> &Emitter<InternalEvent> {
        &self.inner.internal
    }

    /// Close the producer.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "close()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        let _ = self.inner.channel.request_binary(
            Method::TransportCloseProducer,
            Some(self.inner.transport_id.as_str()),
            RequestBody::CloseProducer {
                producer_id: self.inner.id.clone(),
            },
        );

        self.inner.internal.emit(&InternalEvent::Close);
        self.inner.observer.emit(&ProducerObserverEvent::Close);
    }

    /// The owning transport closed.
    pub(crate) fn transport_closed(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(id = %self.inner.id, "transportClosed()");

        self.inner.channel.unsubscribe_all(&self.inner.id);

        self.inner.events.emit(&ProducerEvent::TransportClose);
        self.inner.observer.emit(&ProducerObserverEvent::Close);
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "dump()");
        Ok(self
            .inner
            .channel
            .request(Method::ProducerDump, Some(self.inner.id.as_str()), &())?
            .await?)
    }

    pub async fn get_stats(&self) -> Result<Value> {
        debug!(id = %self.inner.id, "getStats()");
        Ok(self
            .inner
            .channel
            .request(Method::ProducerGetStats, Some(self.inner.id.as_str()), &())?
            .await?)
    }

    pub async fn pause(&self) -> Result<()> {
        debug!(id = %self.inner.id, "pause()");

        self.inner
            .channel
            .request(Method::ProducerPause, Some(self.inner.id.as_str()), &())?
            .await?;

        let was_paused = std::mem::replace(&mut self.inner.state.lock().paused, true);
        if !was_paused {
            self.inner.observer.emit(&ProducerObserverEvent::Pause);
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        debug!(id = %self.inner.id, "resume()");

        self.inner
            .channel
            .request(Method::ProducerResume, Some(self.inner.id.as_str()), &())?
            .await?;

        let was_paused = std::mem::replace(&mut self.inner.state.lock().paused, false);
        if was_paused {
            self.inner.observer.emit(&ProducerObserverEvent::Resume);
        }
        Ok(())
    }

    fn handle_worker_notifications(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.channel.subscribe(&self.inner.id, move |notification| {
            if let Some(inner) = weak.upgrade() {
                Producer { inner }.on_notification(notification);
            }
        });
    }

    fn on_notification(&self, notification: &Notification) {
        match notification.event {
            WorkerEvent::Score => {
                let score = match &notification.data {
                    NotificationData::Binary(NotificationBody::ProducerScores(score)) => {
                        Some(score.clone())
                    }
                    data => json_data::<Vec<ProducerScore>>(data),
                };
                let Some(score) = score else { return };
                self.inner.state.lock().score = score.clone();
                self.inner.events.emit(&ProducerEvent::Score(score.clone()));
                self.inner.observer.emit(&ProducerObserverEvent::Score(score));
            }
            WorkerEvent::VideoOrientationChange => {
                let Some(orientation) = json_data::<VideoOrientation>(&notification.data) else {
                    return;
                };
                self.inner
                    .events
                    .emit(&ProducerEvent::VideoOrientationChange(orientation));
                self.inner
                    .observer
                    .emit(&ProducerObserverEvent::VideoOrientationChange(orientation));
            }
            WorkerEvent::Trace => {
                let trace = json_data::<Value>(&notification.data).unwrap_or(Value::Null);
                self.inner.events.emit(&ProducerEvent::Trace(trace.clone()));
                self.inner.observer.emit(&ProducerObserverEvent::Trace(trace));
            }
            other => debug!(id = %self.inner.id, event = %other, "ignoring unknown event"),
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("closed", &self.closed())
            .finish()
    }
}
