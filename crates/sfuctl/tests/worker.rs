mod common;

use common::{opus_codec, respond, router, start, start_with, webrtc_transport, Recorder, WORKER_PID};
use serde_json::Value;
use sfuctl::channel::testing::Reply;
use sfuctl::channel::{Method, RequestError};
use sfuctl::{
    RouterEventKind, RouterOptions, TransportEventKind, WorkerEvent, WorkerEventKind, WorkerObserverEvent,
    WorkerObserverEventKind,
};

#[tokio::test]
async fn worker_exposes_pid_and_starts_open() {
    let harness = start();

    assert_eq!(harness.worker.pid(), WORKER_PID);
    assert!(!harness.worker.closed());
    assert!(!harness.worker.died());
    assert!(harness.worker.routers().is_empty());
}

#[tokio::test]
async fn process_exit_kills_worker_and_rejects_pending_requests() {
    // Never answer dumps so one stays in flight.
    let mut harness = start_with(|request| {
        if request.method() == "worker.dump" {
            Reply::Silent
        } else {
            respond(request)
        }
    });
    let router = router(&harness).await;
    let transport = webrtc_transport(&router).await;

    let log = Recorder::default();
    let died = log.clone();
    harness.worker.on(WorkerEventKind::Died, move |event| {
        let WorkerEvent::Died(code) = event;
        died.record(format!("died {code:?}"));
    });
    harness.worker.observer().on(WorkerObserverEventKind::Close, log.hook("worker close"));
    router.on(RouterEventKind::WorkerClose, log.hook("router workerclose"));
    transport.on(TransportEventKind::RouterClose, log.hook("transport routerclose"));

    let pending = harness
        .worker
        .channel()
        .request(Method::WorkerDump, None, &())
        .expect("request should be queued");

    harness.exit(Some(1));

    let err = pending.await.expect_err("pending request should be rejected");
    assert!(matches!(err, RequestError::ChannelClosed));

    assert!(harness.worker.closed());
    assert!(harness.worker.died());
    assert!(router.closed());
    assert!(transport.closed());
    assert!(harness.worker.routers().is_empty());
    assert_eq!(
        log.entries(),
        ["transport routerclose", "router workerclose", "died Some(1)", "worker close"]
    );

    let err = harness
        .worker
        .create_router(RouterOptions::new(vec![opus_codec()]))
        .await
        .expect_err("dead worker should refuse routers");
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn close_does_not_report_death() {
    let mut harness = start();
    let router = router(&harness).await;

    let log = Recorder::default();
    harness.worker.on(WorkerEventKind::Died, log.hook("died"));
    harness.worker.observer().on(WorkerObserverEventKind::Close, log.hook("worker close"));
    router.on(RouterEventKind::WorkerClose, log.hook("router workerclose"));

    harness.worker.close();
    harness.worker.close();

    assert!(harness.worker.closed());
    assert!(!harness.worker.died());
    assert!(harness.worker.channel().closed());
    assert!(router.closed());
    assert_eq!(log.entries(), ["router workerclose", "worker close"]);

    // A later process exit is ignored.
    harness.exit(Some(0));
    tokio::task::yield_now().await;
    assert!(!harness.worker.died());
    assert_eq!(log.entries().len(), 2);

    let err = harness
        .worker
        .create_router(RouterOptions::default())
        .await
        .expect_err("closed worker should refuse routers");
    assert!(err.is_invalid_state());

    let err = harness.worker.dump().await.expect_err("closed worker should refuse requests");
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn create_router_announces_and_tracks_router() {
    let harness = start();

    let log = Recorder::default();
    let announced = log.clone();
    harness.worker.observer().on(WorkerObserverEventKind::NewRouter, move |event| {
        if let WorkerObserverEvent::NewRouter(router) = event {
            announced.record(router.id().to_owned());
        }
    });

    let router = router(&harness).await;

    assert_eq!(log.entries(), [router.id()]);
    assert!(harness.worker.router(router.id()).is_some());
    assert_eq!(router.rtp_capabilities()["codecs"][0]["mimeType"], "audio/opus");

    let request = harness
        .fake
        .requests()
        .into_iter()
        .find(|r| r.method() == "worker.createRouter")
        .expect("createRouter should be sent");
    assert_eq!(request.handler_id(), None);
    assert_eq!(request.data()["routerId"], router.id());

    router.close();
    assert!(harness.worker.router(router.id()).is_none());
}

#[tokio::test]
async fn invalid_media_codecs_are_rejected_locally() {
    let harness = start();

    let err = harness
        .worker
        .create_router(RouterOptions::new(vec![Value::from("opus")]))
        .await
        .expect_err("non-object codec should fail");

    assert!(err.is_invalid_argument());
    assert!(harness.fake.requests().is_empty());
}

#[tokio::test]
async fn worker_keeps_routers_until_close() {
    let harness = start();
    let id = router(&harness).await.id().to_owned();

    let router = harness.worker.router(&id).expect("worker should hold the router");
    harness.worker.close();

    assert!(router.closed());
    assert!(harness.worker.router(&id).is_none());
}
