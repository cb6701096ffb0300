//! Channel behaviour against an in-memory fake worker.

use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sfuctl_channel::testing::{payload, FakeWorker, WorkerRequest};
use sfuctl_channel::{
    ChannelConfig, Event, Method, NotificationBody, NotificationData, RejectKind, RequestBody,
    RequestError, ResponseBody,
};
use tokio::sync::mpsc;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn config() -> ChannelConfig {
    ChannelConfig::default()
        .with_pid(4242)
        .with_close_grace(Duration::from_millis(10))
}

async fn settle_reader() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn json_request_round_trip() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    let response = channel
        .request(Method::TransportProduce, Some("t1"), &json!({ "kind": "audio" }))
        .unwrap();

    let request = worker.expect_request().await.unwrap();
    assert_eq!(
        request,
        WorkerRequest::Json {
            id: response.id(),
            method: "transport.produce".into(),
            handler_id: Some("t1".into()),
            data: json!({ "kind": "audio" }),
        }
    );

    worker
        .accept(response.id(), json!({ "type": "simple" }))
        .await
        .unwrap();

    assert_eq!(response.await.unwrap(), json!({ "type": "simple" }));
    assert_eq!(channel.pending_requests(), 0);
}

#[tokio::test]
async fn responses_in_reverse_order_reach_their_callers() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    let futures: Vec<_> = (0..8)
        .map(|n| {
            channel
                .request(Method::ProducerDump, Some(format!("p{n}").as_str()), &Value::Null)
                .unwrap()
        })
        .collect();

    let mut seen = Vec::new();
    for _ in 0..futures.len() {
        let request = worker.expect_request().await.unwrap();
        seen.push((request.id().unwrap(), request.handler_id().unwrap().to_owned()));
    }

    for (id, handler) in seen.iter().rev() {
        worker.accept(*id, json!({ "id": handler })).await.unwrap();
    }

    for (n, future) in futures.into_iter().enumerate() {
        assert_eq!(future.await.unwrap(), json!({ "id": format!("p{n}") }));
    }
}

#[tokio::test]
async fn rejections_carry_their_kind() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    let bad_args = channel
        .request(Method::TransportProduce, Some("t1"), &json!({}))
        .unwrap();
    let failure = channel
        .request(Method::TransportConsume, Some("t1"), &json!({}))
        .unwrap();

    worker
        .reject(bad_args.id(), "TypeError", "missing kind")
        .await
        .unwrap();
    worker
        .reject(failure.id(), "Error", "producer not found")
        .await
        .unwrap();

    match bad_args.await.unwrap_err() {
        RequestError::Rejected { kind, reason } => {
            assert_eq!(kind, RejectKind::InvalidArgument);
            assert_eq!(reason, "missing kind");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = failure.await.unwrap_err();
    assert!(!err.is_invalid_argument());
    assert!(matches!(
        err,
        RequestError::Rejected {
            kind: RejectKind::Failure,
            ..
        }
    ));
}

#[tokio::test]
async fn close_rejects_pending_and_later_requests() {
    init_tracing();
    let (channel, _worker) = FakeWorker::pair(config());

    let pending: Vec<_> = (0..3)
        .map(|_| channel.request(Method::WorkerDump, None, &()).unwrap())
        .collect();
    assert_eq!(channel.pending_requests(), 3);

    channel.close();
    channel.close();

    assert!(channel.closed());
    assert_eq!(channel.pending_requests(), 0);
    for future in pending {
        assert!(future.await.unwrap_err().is_invalid_state());
    }

    let err = channel.request(Method::WorkerDump, None, &()).unwrap_err();
    assert!(err.is_invalid_state());
    let err = channel
        .request_binary(Method::DataConsumerDump, Some("dc"), RequestBody::None)
        .unwrap_err();
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn close_still_flushes_queued_frames() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    let _ = channel
        .request(Method::RouterCloseTransport, Some("r1"), &json!({ "transportId": "t1" }))
        .unwrap();
    channel.close();

    let request = worker.expect_request().await.unwrap();
    assert_eq!(request.method(), "router.closeTransport");
    assert!(worker.next_request().await.unwrap().is_none());
}

#[tokio::test]
async fn response_continuation_runs_before_notification_in_same_batch() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());
    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let seen = Arc::clone(&order);
    channel.subscribe("p1", move |notification| {
        assert_eq!(notification.event, Event::ProducerPause);
        seen.lock().push("notification");
        let _ = done_tx.send(());
    });

    let response = channel
        .request(Method::ProducerPause, Some("p1"), &())
        .unwrap();
    let id = response.id();

    let seen = Arc::clone(&order);
    let caller = tokio::spawn(async move {
        response.await.unwrap();
        seen.lock().push("response");
    });

    worker.expect_request().await.unwrap();
    worker
        .send_batch([
            payload::accept(id, Value::Null),
            payload::notification("p1", "producerpause", Value::Null),
        ])
        .await
        .unwrap();

    done_rx.recv().await.unwrap();
    caller.await.unwrap();
    assert_eq!(*order.lock(), vec!["response", "notification"]);
}

#[tokio::test]
async fn awaiting_caller_sees_response_before_notification() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());
    let notified = Arc::new(Mutex::new(false));

    let flag = Arc::clone(&notified);
    channel.subscribe("c1", move |_| *flag.lock() = true);

    let response = channel
        .request(Method::ConsumerResume, Some("c1"), &())
        .unwrap();
    let id = response.id();

    let responder = tokio::spawn(async move {
        worker.expect_request().await.unwrap();
        worker
            .send_batch([
                payload::accept(id, Value::Null),
                payload::notification("c1", "producerresume", Value::Null),
            ])
            .await
            .unwrap();
        worker
    });

    response.await.unwrap();
    assert!(!*notified.lock(), "notification ran before the response continuation");

    let _worker = responder.await.unwrap();
    settle_reader().await;
    assert!(*notified.lock());
}

#[tokio::test]
async fn notifications_without_listener_are_dropped() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sub = channel.subscribe("dc1", move |n| {
        let _ = tx.send((n.event, n.data.clone()));
    });
    assert_eq!(channel.listener_count("dc1"), 1);

    worker
        .notify("nobody", "score", json!({ "score": 1 }))
        .await
        .unwrap();
    worker
        .notify("dc1", "bufferedamountlow", json!({ "bufferedAmount": 12 }))
        .await
        .unwrap();

    let (event, data) = rx.recv().await.unwrap();
    assert_eq!(event, Event::BufferedAmountLow);
    assert_eq!(data, NotificationData::Json(json!({ "bufferedAmount": 12 })));

    assert!(channel.unsubscribe("dc1", sub));
    assert_eq!(channel.listener_count("dc1"), 0);
}

#[tokio::test]
async fn binary_requests_and_notifications() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel.subscribe("dc1", move |n| {
        let _ = tx.send(n.data.clone());
    });

    let amount = channel
        .request_binary(
            Method::DataConsumerGetBufferedAmount,
            Some("dc1"),
            RequestBody::None,
        )
        .unwrap();
    let closing = channel
        .request_binary(
            Method::TransportCloseDataConsumer,
            Some("t1"),
            RequestBody::CloseDataConsumer {
                data_consumer_id: "dc1".into(),
            },
        )
        .unwrap();

    let WorkerRequest::Binary(first) = worker.expect_request().await.unwrap() else {
        panic!("expected binary request");
    };
    assert_eq!(first.method, Method::DataConsumerGetBufferedAmount);
    assert_eq!(first.handler_id.as_deref(), Some("dc1"));

    let WorkerRequest::Binary(second) = worker.expect_request().await.unwrap() else {
        panic!("expected binary request");
    };
    assert_eq!(
        second.body,
        RequestBody::CloseDataConsumer {
            data_consumer_id: "dc1".into()
        }
    );

    worker
        .accept_binary(first.id, ResponseBody::BufferedAmount(42))
        .await
        .unwrap();
    worker
        .reject_binary(second.id, "Error", "data consumer not found")
        .await
        .unwrap();
    worker
        .notify_binary(
            "dc1",
            Event::Message,
            NotificationBody::Message {
                ppid: 51,
                data: b"hi".to_vec(),
            },
        )
        .await
        .unwrap();

    assert_eq!(amount.await.unwrap(), ResponseBody::BufferedAmount(42));
    assert!(matches!(
        closing.await.unwrap_err(),
        RequestError::Rejected { .. }
    ));
    assert_eq!(
        rx.recv().await.unwrap(),
        NotificationData::Binary(NotificationBody::Message {
            ppid: 51,
            data: b"hi".to_vec()
        })
    );
}

#[tokio::test]
async fn outbound_notification_reaches_worker() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    channel.notify(
        Event::DataProducerSend,
        Some("dp1"),
        NotificationBody::Message {
            ppid: 53,
            data: vec![1, 2, 3],
        },
    );

    let WorkerRequest::Notification(notification) = worker.expect_request().await.unwrap() else {
        panic!("expected notification");
    };
    assert_eq!(notification.event, Event::DataProducerSend);
    assert_eq!(notification.handler_id.as_deref(), Some("dp1"));
}

#[tokio::test]
async fn oversized_request_fails_synchronously() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config().with_max_payload_size(64));

    let err = channel
        .request(Method::TransportProduce, Some("t1"), &"x".repeat(100))
        .unwrap_err();
    assert!(matches!(err, RequestError::TooBig { max: 68, .. }));
    assert!(err.is_invalid_argument());
    assert_eq!(channel.pending_requests(), 0);

    let small = channel.request(Method::WorkerDump, None, &()).unwrap();
    let request = worker.expect_request().await.unwrap();
    assert_eq!(request.id(), Some(small.id()));
}

#[tokio::test]
async fn buffer_overflow_discards_and_resynchronizes() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config().with_max_payload_size(1024));

    let response = channel.request(Method::WorkerDump, None, &()).unwrap();
    worker.expect_request().await.unwrap();

    let mut garbage = BytesMut::new();
    garbage.put_u32_le(4096);
    garbage.put_slice(&[0xAB; 1100]);
    worker.send_raw(&garbage).await.unwrap();
    settle_reader().await;

    worker
        .accept(response.id(), json!({ "pid": 4242 }))
        .await
        .unwrap();
    assert_eq!(response.await.unwrap(), json!({ "pid": 4242 }));
}

#[tokio::test]
async fn maximum_size_response_and_follower_in_one_write() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config().with_max_payload_size(1024));

    let first = channel.request(Method::WorkerDump, None, &()).unwrap();
    let second = channel.request(Method::WorkerDump, None, &()).unwrap();
    worker.expect_request().await.unwrap();
    worker.expect_request().await.unwrap();

    let pad = 1024 - payload::accept(first.id(), json!("")).len();
    let padding = "x".repeat(pad);
    let full = payload::accept(first.id(), json!(padding));
    assert_eq!(full.len(), 1024);
    let follower = payload::accept(second.id(), json!("next"));

    let mut raw = BytesMut::new();
    for frame in [&full, &follower] {
        raw.put_u32_le(frame.len() as u32);
        raw.put_slice(frame);
    }
    worker.send_raw(&raw).await.unwrap();

    assert_eq!(first.await.unwrap(), json!(padding));
    assert_eq!(second.await.unwrap(), json!("next"));
}

#[tokio::test]
async fn malformed_messages_and_logs_do_not_stall_the_channel() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    let response = channel.request(Method::WorkerDump, None, &()).unwrap();
    worker.expect_request().await.unwrap();

    worker
        .send_batch([
            payload::log(b'D', "worker started"),
            payload::log(b'W', "low on ports"),
            payload::log(b'E', "something broke"),
            payload::log(b'X', "{ dump }"),
            bytes::Bytes::from_static(b"{ not json"),
            bytes::Bytes::from_static(b"\x09\xff\xff"),
            bytes::Bytes::from_static(br#"{"event":"score"}"#),
            payload::notification("p1", "nosuchevent", Value::Null),
            payload::accept(response.id(), json!("ok")),
        ])
        .await
        .unwrap();

    assert_eq!(response.await.unwrap(), json!("ok"));
}

#[tokio::test]
async fn unmatched_and_duplicate_responses_are_counted() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    let response = channel.request(Method::WorkerDump, None, &()).unwrap();
    let id = response.id();
    worker.expect_request().await.unwrap();

    worker
        .send_batch([
            payload::accept(9999, Value::Null),
            payload::accept(id, json!(1)),
            payload::accept(id, json!(2)),
        ])
        .await
        .unwrap();

    assert_eq!(response.await.unwrap(), json!(1));
    settle_reader().await;
    assert_eq!(channel.unmatched_responses(), 2);
}

#[tokio::test]
async fn dropped_future_is_fire_and_forget() {
    init_tracing();
    let (channel, mut worker) = FakeWorker::pair(config());

    drop(channel.request(Method::WorkerCloseRouter, None, &json!({ "routerId": "r1" })));
    let follow_up = channel.request(Method::WorkerDump, None, &()).unwrap();

    let first = worker.expect_request().await.unwrap();
    worker.expect_request().await.unwrap();
    worker
        .send_batch([
            payload::accept(first.id().unwrap(), Value::Null),
            payload::accept(follow_up.id(), Value::Null),
        ])
        .await
        .unwrap();

    follow_up.await.unwrap();
    assert_eq!(channel.pending_requests(), 0);
    assert_eq!(channel.unmatched_responses(), 0);
}
