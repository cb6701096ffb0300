use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sfuctl_frame::{FrameError, FrameReader, FrameWriter, PREFIX_SIZE};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{RejectKind, RequestError, Result};
use crate::message::{classify, JsonMessage, Message, WorkerLogLevel};
use crate::method::{Event, Method};
use crate::subscribers::{Notification, NotificationData, Subscribers, SubscriptionId};
use crate::tracker::{Outcome, RequestTracker, Response};
use crate::wire::{
    encode_json_request, NotificationBody, RequestBody, ResponseBody, WireMessage,
    WireNotification, WireRequest,
};

/// Request/response and notification channel to one worker process.
///
/// Owns a reader task that frames, classifies and dispatches inbound
/// payloads, and a writer task that drains the outbound queue. Cloning is
/// cheap; all clones share the same connection.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    pid: u32,
    max_payload_size: usize,
    close_grace: Duration,
    closed: AtomicBool,
    tracker: Mutex<RequestTracker>,
    subscribers: Subscribers,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    shutdown: CancellationToken,
    unmatched: AtomicU64,
}

impl Channel {
    /// Start a channel over the worker's output (`reader`) and input
    /// (`writer`) streams.
    ///
    /// Within one inbound batch, responses are settled before notifications
    /// are dispatched, and the reader task yields once in between. On a
    /// current-thread runtime that yield lets every continuation woken by
    /// those responses run before any notification handler. On a
    /// multi-thread runtime those continuations may run on other workers
    /// concurrently with notification dispatch, so only the settle-first
    /// order is guaranteed there.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, config: ChannelConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug!(pid = config.pid, "constructor()");

        let frame_config = config.frame_config();
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            pid: config.pid,
            max_payload_size: config.max_payload_size,
            close_grace: config.close_grace,
            closed: AtomicBool::new(false),
            tracker: Mutex::new(RequestTracker::new()),
            subscribers: Subscribers::new(),
            outbound: Mutex::new(Some(tx)),
            shutdown: CancellationToken::new(),
            unmatched: AtomicU64::new(0),
        });

        tokio::spawn(read_loop(
            Arc::clone(&inner),
            FrameReader::with_config(reader, frame_config.clone()),
        ));
        tokio::spawn(write_loop(
            FrameWriter::with_config(writer, frame_config),
            rx,
            inner.shutdown.clone(),
        ));

        Self { inner }
    }

    /// Send a JSON-path request.
    ///
    /// Fails immediately when the channel is closed or the request does not
    /// fit in one frame. Otherwise the frame is queued and the returned
    /// future settles with the worker's `data`. Dropping the future does not
    /// cancel the request.
    pub fn request<T>(
        &self,
        method: Method,
        handler_id: Option<&str>,
        data: &T,
    ) -> Result<ResponseFuture<Value>>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(data)?;
        self.send_request(method, |id| {
            Ok(encode_json_request(id, method, handler_id, &json).into_bytes())
        })
    }

    /// Send a binary-path request.
    pub fn request_binary(
        &self,
        method: Method,
        handler_id: Option<&str>,
        body: RequestBody,
    ) -> Result<ResponseFuture<ResponseBody>> {
        self.send_request(method, |id| {
            let request = WireMessage::Request(WireRequest {
                id,
                method,
                handler_id: handler_id.map(str::to_owned),
                body,
            });
            Ok(request.encode()?)
        })
    }

    fn send_request<T>(
        &self,
        method: Method,
        encode: impl FnOnce(u32) -> Result<Vec<u8>>,
    ) -> Result<ResponseFuture<T>> {
        // Held until the frame is queued, so frames enter the queue in id order.
        let mut tracker = self.inner.tracker.lock();
        let id = tracker.next_id();

        debug!(%method, id, "request()");

        if tracker.is_closed() {
            return Err(RequestError::ChannelClosed);
        }

        let payload = encode(id)?;
        self.inner.check_size(payload.len())?;

        let rx = tracker.register(id, method)?;
        if !self.inner.enqueue(Bytes::from(payload)) {
            tracker.forget(id);
            return Err(RequestError::ChannelClosed);
        }

        Ok(ResponseFuture {
            id,
            rx,
            _marker: PhantomData,
        })
    }

    /// Send a binary notification. Nothing is returned by the worker; every
    /// failure is logged only.
    pub fn notify(&self, event: Event, handler_id: Option<&str>, body: NotificationBody) {
        trace!(%event, handler_id, "notify()");

        if self.closed() {
            warn!(%event, "notify() on closed channel");
            return;
        }

        let notification = WireMessage::Notification(WireNotification {
            handler_id: handler_id.map(str::to_owned),
            event,
            body,
        });

        let payload = match notification.encode() {
            Ok(payload) => payload,
            Err(err) => {
                error!(%event, %err, "failed to encode notification");
                return;
            }
        };

        if let Err(err) = self.inner.check_size(payload.len()) {
            error!(%event, %err, "notification dropped");
            return;
        }

        if !self.inner.enqueue(Bytes::from(payload)) {
            warn!(%event, "notify() on closed channel");
        }
    }

    /// Listen for notifications addressed to `target_id`.
    pub fn subscribe<F>(&self, target_id: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(target_id, handler)
    }

    pub fn unsubscribe(&self, target_id: &str, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(target_id, id)
    }

    /// Drop every listener for `target_id`.
    pub fn unsubscribe_all(&self, target_id: &str) {
        self.inner.subscribers.unsubscribe_all(target_id);
    }

    pub fn listener_count(&self, target_id: &str) -> usize {
        self.inner.subscribers.listener_count(target_id)
    }

    /// Close the channel.
    ///
    /// Idempotent. Every pending request is rejected with
    /// [`RequestError::ChannelClosed`] before this returns. Frames already
    /// queued are still written. The I/O tasks stop after the configured
    /// grace period.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(pid = self.inner.pid, "close()");

        let rejected = self.inner.tracker.lock().reject_all();
        if rejected > 0 {
            debug!(count = rejected, "rejected pending requests");
        }

        // Writer flushes what is queued and shuts the stream down.
        self.inner.outbound.lock().take();

        let token = self.inner.shutdown.clone();
        let grace = self.inner.close_grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !grace.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    token.cancel();
                });
            }
            _ => token.cancel(),
        }
    }

    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.tracker.lock().len()
    }

    /// Responses received whose id matched no pending request.
    pub fn unmatched_responses(&self) -> u64 {
        self.inner.unmatched.load(Ordering::Relaxed)
    }

    /// Worker process id.
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("pid", &self.inner.pid)
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn check_size(&self, payload_len: usize) -> Result<()> {
        if payload_len > self.max_payload_size {
            return Err(RequestError::TooBig {
                size: payload_len + PREFIX_SIZE,
                max: self.max_payload_size + PREFIX_SIZE,
            });
        }
        Ok(())
    }

    fn enqueue(&self, frame: Bytes) -> bool {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Process one inbound batch. Responses are settled as they are seen;
    /// notifications are dispatched after one yield, which on a
    /// current-thread runtime lets the continuations woken by this batch run
    /// first.
    async fn process_batch(&self, frames: Vec<Bytes>) {
        let mut deferred = Vec::new();

        for payload in frames {
            let message = match classify(&payload) {
                Ok(message) => message,
                Err(err) => {
                    error!(%err, len = payload.len(), "received invalid message from the worker process");
                    continue;
                }
            };

            if let Some(notification) = self.handle_message(message) {
                deferred.push(notification);
            }
        }

        if deferred.is_empty() {
            return;
        }

        tokio::task::yield_now().await;

        for notification in &deferred {
            let delivered = self.subscribers.dispatch(notification);
            trace!(
                target_id = %notification.target_id,
                event = %notification.event,
                delivered,
                "dispatched notification"
            );
        }
    }

    fn handle_message(&self, message: Message) -> Option<Notification> {
        match message {
            Message::Json(json) => self.handle_json(json),
            Message::Binary(WireMessage::Response(response)) => {
                self.settle(
                    response.id,
                    response.accepted,
                    response.error,
                    response.reason,
                    Response::Binary(response.body),
                );
                None
            }
            Message::Binary(WireMessage::Notification(notification)) => {
                match notification.handler_id {
                    Some(target_id) if !target_id.is_empty() => Some(Notification {
                        target_id,
                        event: notification.event,
                        data: NotificationData::Binary(notification.body),
                    }),
                    _ => {
                        error!(event = %notification.event, "received notification without target");
                        None
                    }
                }
            }
            Message::Binary(WireMessage::Request(request)) => {
                error!(id = request.id, method = %request.method, "received request from the worker process");
                None
            }
            Message::Log { level, text } => {
                let pid = self.pid;
                match level {
                    WorkerLogLevel::Debug => debug!(target: "sfuctl::worker", pid, "{text}"),
                    WorkerLogLevel::Warn => warn!(target: "sfuctl::worker", pid, "{text}"),
                    WorkerLogLevel::Error => error!(target: "sfuctl::worker", pid, "{text}"),
                }
                None
            }
            Message::Dump(text) => {
                info!(target: "sfuctl::worker::dump", pid = self.pid, "{text}");
                None
            }
        }
    }

    fn handle_json(&self, json: JsonMessage) -> Option<Notification> {
        if let Some(id) = json.response_id() {
            self.settle(
                id,
                json.accepted.unwrap_or(false),
                json.error,
                json.reason,
                Response::Json(json.data.unwrap_or(Value::Null)),
            );
            return None;
        }

        let Some((target_id, tag)) = json.notification_target() else {
            error!("received message is not a response nor a notification");
            return None;
        };

        match Event::from_tag(tag) {
            Some(event) => Some(Notification {
                target_id,
                event,
                data: NotificationData::Json(json.data.unwrap_or(Value::Null)),
            }),
            None => {
                error!(%target_id, event = tag, "received notification with unknown event");
                None
            }
        }
    }

    fn settle(
        &self,
        id: u32,
        accepted: bool,
        error: Option<String>,
        reason: Option<String>,
        response: Response,
    ) {
        let mut tracker = self.tracker.lock();

        let Some(method) = tracker.method_of(id) else {
            drop(tracker);
            self.unmatched.fetch_add(1, Ordering::Relaxed);
            error!(id, "received response does not match any sent request");
            return;
        };

        if accepted {
            debug!(%method, id, "request succeeded");
            tracker.resolve(id, response);
        } else if let Some(error) = error {
            let reason = reason.unwrap_or_default();
            warn!(%method, id, %reason, "request failed");
            tracker.reject(
                id,
                RequestError::Rejected {
                    kind: RejectKind::from_worker(Some(&error)),
                    reason,
                },
            );
        } else {
            error!(%method, id, "received response is not accepted nor rejected");
        }
    }
}

async fn read_loop<R>(inner: Arc<Inner>, mut reader: FrameReader<R>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let batch = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            batch = reader.read_batch() => batch,
        };

        match batch {
            Ok(frames) => inner.process_batch(frames).await,
            Err(FrameError::BufferOverflow { size, max }) => {
                error!(size, max, "receiving buffer is full, discarding all data in it");
            }
            Err(FrameError::ConnectionClosed) => {
                debug!(pid = inner.pid, "channel ended by the worker process");
                break;
            }
            Err(err) => {
                if inner.closed.load(Ordering::SeqCst) {
                    debug!(%err, "channel read error after close");
                } else {
                    error!(%err, "channel read error");
                }
                break;
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = rx.recv() => frame,
        };

        let Some(first) = first else {
            // Every sender is gone: the channel was closed.
            if let Err(err) = writer.shutdown().await {
                debug!(%err, "channel write shutdown failed");
            }
            return;
        };

        let mut frames = vec![first];
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }

        let count = frames.len();
        let result = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = writer.send_all(frames) => result,
        };

        match result {
            Ok(()) => trace!(count, "wrote frames"),
            Err(err) => error!(%err, count, "channel write error"),
        }
    }
}

/// Converts an accepted response into the type a request future yields.
pub trait FromResponse: Sized {
    fn from_response(response: Response) -> Result<Self>;
}

impl FromResponse for Value {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::Json(value) => Ok(value),
            Response::Binary(_) => Err(RequestError::UnexpectedResponse),
        }
    }
}

impl FromResponse for ResponseBody {
    fn from_response(response: Response) -> Result<Self> {
        match response {
            Response::Binary(body) => Ok(body),
            Response::Json(_) => Err(RequestError::UnexpectedResponse),
        }
    }
}

/// Future returned by [`Channel::request`] and [`Channel::request_binary`].
#[must_use = "dropping the future discards the response but the request is still sent"]
pub struct ResponseFuture<T> {
    id: u32,
    rx: oneshot::Receiver<Outcome>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResponseFuture<T> {
    /// Id assigned to the request.
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl<T: FromResponse> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match ready!(Pin::new(&mut this.rx).poll(cx)) {
            Ok(outcome) => outcome,
            Err(_) => Err(RequestError::ChannelClosed),
        };
        Poll::Ready(outcome.and_then(T::from_response))
    }
}

impl<T> std::fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture").field("id", &self.id).finish()
    }
}
