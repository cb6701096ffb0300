#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use sfuctl::channel::testing::{FakeWorker, Reply, ServeHandle, WorkerRequest};
use sfuctl::channel::{ConsumeResponse, ConsumerScore, Method, ResponseBody};
use sfuctl::data::MediaKind;
use sfuctl::{ProducerOptions, Router, RouterOptions, Transport, TransportOptions, Worker, WorkerSettings};
use tokio::sync::oneshot;

/// MIS reported for transports created with SCTP enabled.
pub const SCTP_STREAMS: u16 = 4;

pub const WORKER_PID: u32 = 4242;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A worker attached to a fake worker process.
pub struct Harness {
    pub worker: Worker,
    pub fake: ServeHandle,
    exit: Option<oneshot::Sender<Option<i32>>>,
}

impl Harness {
    /// Simulate the worker process exiting.
    pub fn exit(&mut self, code: Option<i32>) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(code);
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.fake.methods()
    }
}

/// Default worker behaviour: accept everything with plausible data.
pub fn respond(request: &WorkerRequest) -> Reply {
    if let WorkerRequest::Binary(binary) = request {
        return match binary.method {
            Method::TransportConsume => Reply::AcceptBinary(ResponseBody::Consume(ConsumeResponse {
                paused: false,
                producer_paused: false,
                score: Some(ConsumerScore {
                    score: 10,
                    producer_score: 10,
                    producer_scores: vec![10],
                }),
                preferred_layers: None,
            })),
            Method::DataConsumerGetBufferedAmount => Reply::AcceptBinary(ResponseBody::BufferedAmount(0)),
            Method::DataProducerDump | Method::DataConsumerDump => {
                let dump = json!({ "id": binary.handler_id }).to_string();
                Reply::AcceptBinary(ResponseBody::Dump(dump.into_bytes()))
            }
            _ => Reply::AcceptBinary(ResponseBody::None),
        };
    }

    match request.method() {
        "router.createWebRtcTransport" | "router.createPipeTransport" => Reply::Accept(json!({
            "id": request.data()["transportId"],
            "sctpParameters": {
                "port": 5000,
                "OS": SCTP_STREAMS,
                "MIS": SCTP_STREAMS,
                "maxMessageSize": 262_144,
            },
        })),
        "router.createPlainTransport" | "router.createDirectTransport" => {
            Reply::Accept(json!({ "id": request.data()["transportId"] }))
        }
        "transport.produce" => Reply::Accept(json!({ "type": "simple" })),
        _ => Reply::Accept(Value::Null),
    }
}

pub fn start() -> Harness {
    start_with(respond)
}

/// Start a worker whose requests are answered by `handler`.
pub fn start_with<F>(handler: F) -> Harness
where
    F: FnMut(&WorkerRequest) -> Reply + Send + 'static,
{
    init_tracing();

    let (fake, reader, writer) = FakeWorker::connect();
    let (exit_tx, exit_rx) = oneshot::channel();
    let exit = async move {
        match exit_rx.await {
            Ok(code) => code,
            Err(_) => std::future::pending().await,
        }
    };

    let mut settings = WorkerSettings::default().with_pid(WORKER_PID);
    settings.channel = settings.channel.with_close_grace(Duration::from_millis(10));

    let worker = Worker::new(reader, writer, exit, settings);

    Harness {
        worker,
        fake: fake.serve(handler),
        exit: Some(exit_tx),
    }
}

pub fn opus_codec() -> Value {
    json!({
        "kind": "audio",
        "mimeType": "audio/opus",
        "clockRate": 48000,
        "channels": 2,
    })
}

pub fn rtp_capabilities() -> Value {
    json!({ "codecs": [opus_codec()], "headerExtensions": [] })
}

pub fn audio_rtp_parameters(cname: Option<&str>) -> Value {
    let mut params = json!({
        "mid": "AUDIO",
        "codecs": [{
            "mimeType": "audio/opus",
            "payloadType": 111,
            "clockRate": 48000,
            "channels": 2,
        }],
        "encodings": [{ "ssrc": 11_111_111 }],
    });
    if let Some(cname) = cname {
        params["rtcp"] = json!({ "cname": cname });
    }
    params
}

pub fn audio_producer_options() -> ProducerOptions {
    ProducerOptions::new(MediaKind::Audio, audio_rtp_parameters(Some("alice")))
}

pub async fn router(harness: &Harness) -> Router {
    harness
        .worker
        .create_router(RouterOptions::new(vec![opus_codec()]))
        .await
        .expect("router should be created")
}

pub async fn webrtc_transport(router: &Router) -> Transport {
    router
        .create_webrtc_transport(TransportOptions::new(json!({ "listenIps": ["127.0.0.1"] })))
        .await
        .expect("webrtc transport should be created")
}

/// Shared log of event names, for asserting order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    /// A closure that records `entry` each time it is called.
    pub fn hook<E: 'static>(&self, entry: impl Into<String>) -> impl Fn(&E) + Send + Sync + 'static {
        let recorder = self.clone();
        let entry = entry.into();
        move |_: &E| recorder.record(entry.clone())
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Wait until the worker has answered everything sent so far.
///
/// A dump request is answered after every earlier request and injected
/// payload, so awaiting it also flushes pending notifications.
pub async fn round_trip(harness: &Harness) {
    harness.worker.dump().await.expect("dump should succeed");
}
