//! In-memory fake worker for tests.
//!
//! [`FakeWorker::pair`] connects a [`Channel`] to the worker side of two
//! `tokio::io::duplex` pipes. The fake decodes what the channel writes with
//! the same framing and lets a test answer requests, push notifications and
//! log lines, or write arbitrary bytes.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sfuctl_frame::{encode_frame, FrameError, FrameReader};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::method::Event;
use crate::wire::{NotificationBody, ResponseBody, WireMessage, WireNotification, WireRequest, WireResponse};

const PIPE_CAPACITY: usize = 256 * 1024;

/// A request (or notification) the channel sent to the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    Json {
        id: u32,
        method: String,
        handler_id: Option<String>,
        data: Value,
    },
    Binary(WireRequest),
    Notification(WireNotification),
}

impl WorkerRequest {
    /// Request id; `None` for notifications.
    pub fn id(&self) -> Option<u32> {
        match self {
            Self::Json { id, .. } => Some(*id),
            Self::Binary(request) => Some(request.id),
            Self::Notification(_) => None,
        }
    }

    /// Method or event tag as text.
    pub fn method(&self) -> &str {
        match self {
            Self::Json { method, .. } => method,
            Self::Binary(request) => request.method.as_str(),
            Self::Notification(notification) => notification.event.as_str(),
        }
    }

    pub fn handler_id(&self) -> Option<&str> {
        match self {
            Self::Json { handler_id, .. } => handler_id.as_deref(),
            Self::Binary(request) => request.handler_id.as_deref(),
            Self::Notification(notification) => notification.handler_id.as_deref(),
        }
    }

    /// JSON data of a JSON request; `Null` otherwise.
    pub fn data(&self) -> &Value {
        match self {
            Self::Json { data, .. } => data,
            _ => &Value::Null,
        }
    }

    fn parse(payload: &[u8]) -> io::Result<Self> {
        if payload.first() == Some(&b'r') {
            let text = std::str::from_utf8(&payload[1..]).map_err(invalid)?;
            let mut parts = text.splitn(4, ':');
            let (Some(id), Some(method), Some(handler), Some(data)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid("truncated json request"));
            };
            return Ok(Self::Json {
                id: id.parse().map_err(invalid)?,
                method: method.to_owned(),
                handler_id: (!handler.is_empty()).then(|| handler.to_owned()),
                data: serde_json::from_str(data).map_err(invalid)?,
            });
        }

        match WireMessage::decode(payload).map_err(invalid)? {
            WireMessage::Request(request) => Ok(Self::Binary(request)),
            WireMessage::Notification(notification) => Ok(Self::Notification(notification)),
            WireMessage::Response(_) => Err(invalid("channel sent a response")),
        }
    }
}

fn invalid<E: Into<Box<dyn std::error::Error + Send + Sync>>>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Answer chosen by a [`FakeWorker::serve`] handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Accept(Value),
    AcceptBinary(ResponseBody),
    Reject { error: String, reason: String },
    /// Leave the request pending.
    Silent,
}

impl Reply {
    pub fn reject(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reject {
            error: error.into(),
            reason: reason.into(),
        }
    }
}

/// Payload builders for hand-assembled batches.
pub mod payload {
    use super::*;

    /// JSON response accepting request `id`.
    pub fn accept(id: u32, data: Value) -> Bytes {
        Bytes::from(json!({ "id": id, "accepted": true, "data": data }).to_string())
    }

    /// JSON response rejecting request `id`.
    pub fn reject(id: u32, error: &str, reason: &str) -> Bytes {
        Bytes::from(json!({ "id": id, "error": error, "reason": reason }).to_string())
    }

    /// JSON notification.
    pub fn notification(target_id: &str, event: &str, data: Value) -> Bytes {
        Bytes::from(json!({ "targetId": target_id, "event": event, "data": data }).to_string())
    }

    /// Binary response.
    pub fn binary(response: WireResponse) -> io::Result<Bytes> {
        WireMessage::Response(response)
            .encode()
            .map(Bytes::from)
            .map_err(invalid)
    }

    /// Binary notification.
    pub fn binary_notification(
        target_id: &str,
        event: Event,
        body: NotificationBody,
    ) -> io::Result<Bytes> {
        WireMessage::Notification(WireNotification {
            handler_id: Some(target_id.to_owned()),
            event,
            body,
        })
        .encode()
        .map(Bytes::from)
        .map_err(invalid)
    }

    /// Worker log line; `tag` is one of `D`, `W`, `E`, `X`.
    pub fn log(tag: u8, text: &str) -> Bytes {
        let mut out = Vec::with_capacity(text.len() + 1);
        out.push(tag);
        out.extend_from_slice(text.as_bytes());
        Bytes::from(out)
    }
}

/// Worker side of an in-memory channel.
pub struct FakeWorker {
    reader: FrameReader<DuplexStream>,
    writer: DuplexStream,
    queued: VecDeque<Bytes>,
}

impl FakeWorker {
    /// Create a channel connected to a fresh fake worker.
    pub fn pair(config: ChannelConfig) -> (Channel, FakeWorker) {
        let (worker, channel_in, channel_out) = Self::connect();
        (Channel::new(channel_in, channel_out, config), worker)
    }

    /// Create a fake worker and the two streams a channel to it reads from
    /// and writes to.
    pub fn connect() -> (FakeWorker, DuplexStream, DuplexStream) {
        let (channel_out, worker_in) = tokio::io::duplex(PIPE_CAPACITY);
        let (worker_out, channel_in) = tokio::io::duplex(PIPE_CAPACITY);
        let worker = FakeWorker {
            reader: FrameReader::new(worker_in),
            writer: worker_out,
            queued: VecDeque::new(),
        };
        (worker, channel_in, channel_out)
    }

    /// Next frame written by the channel, or `None` once the channel's
    /// output is shut down.
    pub async fn next_request(&mut self) -> io::Result<Option<WorkerRequest>> {
        loop {
            if let Some(payload) = self.queued.pop_front() {
                return WorkerRequest::parse(&payload).map(Some);
            }
            match self.reader.read_batch().await {
                Ok(batch) => self.queued.extend(batch),
                Err(FrameError::ConnectionClosed) => return Ok(None),
                Err(FrameError::Io(err)) => return Err(err),
                Err(err) => return Err(invalid(err)),
            }
        }
    }

    /// Next request, failing when the channel went away.
    pub async fn expect_request(&mut self) -> io::Result<WorkerRequest> {
        self.next_request()
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "channel output closed"))
    }

    pub async fn accept(&mut self, id: u32, data: Value) -> io::Result<()> {
        self.send(payload::accept(id, data)).await
    }

    pub async fn reject(&mut self, id: u32, error: &str, reason: &str) -> io::Result<()> {
        self.send(payload::reject(id, error, reason)).await
    }

    pub async fn accept_binary(&mut self, id: u32, body: ResponseBody) -> io::Result<()> {
        self.send(payload::binary(WireResponse::accepted(id, body))?)
            .await
    }

    pub async fn reject_binary(&mut self, id: u32, error: &str, reason: &str) -> io::Result<()> {
        self.send(payload::binary(WireResponse::rejected(id, error, reason))?)
            .await
    }

    pub async fn notify(&mut self, target_id: &str, event: &str, data: Value) -> io::Result<()> {
        self.send(payload::notification(target_id, event, data)).await
    }

    pub async fn notify_binary(
        &mut self,
        target_id: &str,
        event: Event,
        body: NotificationBody,
    ) -> io::Result<()> {
        self.send(payload::binary_notification(target_id, event, body)?)
            .await
    }

    pub async fn log(&mut self, tag: u8, text: &str) -> io::Result<()> {
        self.send(payload::log(tag, text)).await
    }

    /// Frame and write one payload.
    pub async fn send(&mut self, payload: Bytes) -> io::Result<()> {
        self.send_batch([payload]).await
    }

    /// Frame several payloads and write them with a single write, so the
    /// channel sees them in one batch.
    pub async fn send_batch(&mut self, payloads: impl IntoIterator<Item = Bytes>) -> io::Result<()> {
        let mut wire = BytesMut::new();
        for payload in payloads {
            encode_frame(&payload, &mut wire).map_err(invalid)?;
        }
        self.send_raw(&wire).await
    }

    /// Write bytes as they are, without framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Shut down the worker's output; the channel reads EOF.
    pub async fn close_output(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }

    /// Answer every request with `handler` on a background task.
    ///
    /// The returned handle records what the channel sent and can inject
    /// payloads (notifications, log lines) in order with the replies.
    pub fn serve<F>(mut self, mut handler: F) -> ServeHandle
    where
        F: FnMut(&WorkerRequest) -> Reply + Send + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (inject_tx, mut inject_rx) = mpsc::unbounded_channel::<Vec<Bytes>>();
        let recorded = Arc::clone(&requests);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    injected = inject_rx.recv() => match injected {
                        Some(batch) => self.send_batch(batch).await?,
                        None => break,
                    },
                    request = self.next_request() => {
                        let Some(request) = request? else { break };
                        recorded.lock().push(request.clone());
                        let Some(id) = request.id() else { continue };
                        match handler(&request) {
                            Reply::Accept(data) => self.accept(id, data).await?,
                            Reply::AcceptBinary(body) => self.accept_binary(id, body).await?,
                            Reply::Reject { error, reason } => {
                                if matches!(request, WorkerRequest::Binary(_)) {
                                    self.reject_binary(id, &error, &reason).await?
                                } else {
                                    self.reject(id, &error, &reason).await?
                                }
                            }
                            Reply::Silent => {}
                        }
                    }
                }
            }
            Ok::<(), io::Error>(())
        });

        ServeHandle {
            requests,
            inject: inject_tx,
            task,
        }
    }
}

/// Handle to a worker started with [`FakeWorker::serve`].
pub struct ServeHandle {
    requests: Arc<Mutex<Vec<WorkerRequest>>>,
    inject: mpsc::UnboundedSender<Vec<Bytes>>,
    task: JoinHandle<io::Result<()>>,
}

impl ServeHandle {
    /// Everything the channel has sent so far.
    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().clone()
    }

    /// Method tags of everything the channel has sent so far.
    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.method().to_owned())
            .collect()
    }

    /// Queue payloads to be written together as one batch.
    pub fn inject(&self, payloads: Vec<Bytes>) {
        let _ = self.inject.send(payloads);
    }

    /// Queue a JSON notification.
    pub fn notify(&self, target_id: &str, event: &str, data: Value) {
        self.inject(vec![payload::notification(target_id, event, data)]);
    }

    /// Stop answering.
    pub fn abort(&self) {
        self.task.abort();
    }
}
