use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use sfuctl_channel::{Channel, ChannelConfig, Method};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error};
use uuid::Uuid;

use crate::data::AppData;
use crate::error::{Error, Result};
use crate::events::{Emitter, HandlerId, InternalEventKind};
use crate::negotiation::{BasicNegotiator, CapabilityNegotiator};
use crate::registry::Registry;
use crate::router::{Router, RouterOptions, RouterParams};

crate::events! {
    /// Events of a [`Worker`] for its owner.
    pub enum WorkerEvent: WorkerEventKind {
        /// The worker process exited while the worker was open. Carries the
        /// exit code when there is one.
        Died(Option<i32>),
    }
}

crate::events! {
    /// Events of a [`Worker`] for monitoring.
    pub enum WorkerObserverEvent: WorkerObserverEventKind {
        Close,
        NewRouter(Router),
    }
}

/// Settings for [`Worker::new`].
#[derive(Clone)]
pub struct WorkerSettings {
    pub channel: ChannelConfig,
    /// Validates and transforms RTP and SCTP parameters.
    pub negotiator: Arc<dyn CapabilityNegotiator>,
    pub app_data: AppData,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            negotiator: Arc::new(BasicNegotiator),
            app_data: AppData::new(),
        }
    }
}

impl WorkerSettings {
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.channel = self.channel.with_pid(pid);
        self
    }

    pub fn with_negotiator(mut self, negotiator: Arc<dyn CapabilityNegotiator>) -> Self {
        self.negotiator = negotiator;
        self
    }
}

impl fmt::Debug for WorkerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSettings")
            .field("channel", &self.channel)
            .field("app_data", &self.app_data)
            .finish_non_exhaustive()
    }
}

struct Inner {
    channel: Channel,
    negotiator: Arc<dyn CapabilityNegotiator>,
    app_data: AppData,
    closed: AtomicBool,
    died: AtomicBool,
    routers: Mutex<Registry<Router>>,
    events: Emitter<WorkerEvent>,
    observer: Emitter<WorkerObserverEvent>,
}

/// Handle to a media worker process.
///
/// The process itself is managed elsewhere: the worker only sees the two ends
/// of its control stream and a future that completes when the process exits.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl Worker {
    /// Attach to a worker process.
    ///
    /// `reader` carries the worker's output and `writer` its input. `exit`
    /// completes with the exit code when the process ends.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<R, W, E>(reader: R, writer: W, exit: E, settings: WorkerSettings) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        E: Future<Output = Option<i32>> + Send + 'static,
    {
        debug!(pid = settings.channel.pid, "constructor()");

        let worker = Self {
            inner: Arc::new(Inner {
                channel: Channel::new(reader, writer, settings.channel),
                negotiator: settings.negotiator,
                app_data: settings.app_data,
                closed: AtomicBool::new(false),
                died: AtomicBool::new(false),
                routers: Mutex::new(Registry::default()),
                events: Emitter::new(),
                observer: Emitter::new(),
            }),
        };

        let weak = Arc::downgrade(&worker.inner);
        tokio::spawn(async move {
            let code = exit.await;
            if let Some(inner) = weak.upgrade() {
                Worker { inner }.on_exit(code);
            }
        });

        worker
    }

    pub fn pid(&self) -> u32 {
        self.inner.channel.pid()
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The process exited while the worker was open.
    pub fn died(&self) -> bool {
        self.inner.died.load(Ordering::SeqCst)
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// The control channel to the worker process.
    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn router(&self, id: &str) -> Option<Router> {
        self.inner.routers.lock().get(id)
    }

    pub fn routers(&self) -> Vec<Router> {
        self.inner.routers.lock().values()
    }

    pub fn on<F>(&self, kind: WorkerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn observer(&self) -> &Emitter<WorkerObserverEvent> {
        &self.inner.observer
    }

    /// Close the worker and every router on it.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(pid = self.pid(), "close()");

        self.inner.channel.close();
        self.close_routers();

        self.inner.observer.emit(&WorkerObserverEvent::Close);
    }

    fn on_exit(&self, code: Option<i32>) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        error!(pid = self.pid(), ?code, "worker process died unexpectedly");

        self.inner.died.store(true, Ordering::SeqCst);
        self.inner.channel.close();
        self.close_routers();

        self.inner.events.emit(&WorkerEvent::Died(code));
        self.inner.observer.emit(&WorkerObserverEvent::Close);
    }

    fn close_routers(&self) {
        let routers = self.inner.routers.lock().take();
        for router in routers {
            router.worker_closed();
        }
    }

    pub async fn dump(&self) -> Result<Value> {
        debug!(pid = self.pid(), "dump()");
        Ok(self.inner.channel.request(Method::WorkerDump, None, &())?.await?)
    }

    /// Create a router.
    pub async fn create_router(&self, options: RouterOptions) -> Result<Router> {
        debug!(pid = self.pid(), "createRouter()");

        if self.closed() {
            return Err(Error::InvalidState("worker closed"));
        }

        let RouterOptions {
            media_codecs,
            app_data,
        } = options;

        let rtp_capabilities = self.inner.negotiator.router_rtp_capabilities(&media_codecs)?;
        let router_id = Uuid::new_v4().to_string();

        self.inner
            .channel
            .request(Method::WorkerCreateRouter, None, &json!({ "routerId": router_id }))?
            .await?;

        let router = Router::new(RouterParams {
            id: router_id.clone(),
            rtp_capabilities,
            channel: self.inner.channel.clone(),
            negotiator: Arc::clone(&self.inner.negotiator),
            app_data,
        });

        if self.closed() {
            router.worker_closed();
            return Err(Error::InvalidState("worker closed"));
        }

        self.inner
            .routers
            .lock()
            .insert(router_id.clone(), router.clone());

        let weak = Arc::downgrade(&self.inner);
        router.internal().on(InternalEventKind::Close, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.routers.lock().remove(&router_id);
            }
        });

        self.inner
            .observer
            .emit(&WorkerObserverEvent::NewRouter(router.clone()));

        Ok(router)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("pid", &self.pid())
            .field("closed", &self.closed())
            .field("died", &self.died())
            .finish()
    }
}
