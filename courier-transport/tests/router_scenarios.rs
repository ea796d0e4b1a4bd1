//! End-to-end routing scenarios: two routers exchanging encoded batches,
//! timeouts on the paused Tokio clock, callbacks, shutdown and inbound
//! validation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_transport::{
    CodecError, CorrelationToken, Envelope, EnvelopeBatch, Handler, HandlerError, JsonCodec,
    MessageCodec, ReplyError, Reply, Routed, Router, RouterConfig, RouterError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Ping {
    seq: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Pong {
    seq: u64,
}

struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    type Request = Ping;

    fn parse(&self, payload: &Bytes) -> Result<Ping, CodecError> {
        JsonCodec.decode(payload)
    }

    async fn handle(
        &self,
        ping: Ping,
        _envelope: &Envelope,
    ) -> Result<Option<Reply>, HandlerError> {
        Ok(Some(Reply::encode("pong", &JsonCodec, &Pong { seq: ping.seq })?))
    }
}

struct Sink;

#[async_trait]
impl Handler for Sink {
    type Request = ();

    fn parse(&self, _payload: &Bytes) -> Result<(), CodecError> {
        Ok(())
    }

    async fn handle(
        &self,
        _request: (),
        _envelope: &Envelope,
    ) -> Result<Option<Reply>, HandlerError> {
        Ok(None)
    }
}

fn server() -> Router {
    Router::builder(RouterConfig::new("server-1"))
        .handler("ping", PingHandler)
        .handler("notify", Sink)
        .build()
        .expect("build server")
}

fn client(config: RouterConfig) -> Router {
    Router::builder(config).build().expect("build client")
}

fn ping_payload(seq: u64) -> Vec<u8> {
    JsonCodec.encode(&Ping { seq }).expect("encode ping")
}

#[tokio::test]
async fn ping_pong_resolves_pending_request() {
    init_tracing();
    let client = client(RouterConfig::new("peer-7"));
    let server = server();

    let (request, pending) = client
        .request("ping", ping_payload(1))
        .with_token("abc123")
        .register()
        .expect("register");
    assert_eq!(client.pending_count(), 1);

    // The server only knows the connection the bytes arrived on.
    let wire = EnvelopeBatch::single(request).encode();
    let mut results = server.route_bytes("peer-7", &wire).await.expect("decode");
    assert_eq!(results.len(), 1);

    let Ok(Routed::Replied { destination, reply }) = results.remove(0) else {
        panic!("ping should produce a reply");
    };
    assert_eq!(destination, "peer-7");
    assert_eq!(reply.correlation_token(), &CorrelationToken::from("abc123"));

    let wire = EnvelopeBatch::single(reply).encode();
    let results = client.route_bytes("server-1", &wire).await.expect("decode");
    assert!(matches!(
        results.as_slice(),
        [Ok(Routed::Resolved { token })] if token == "abc123"
    ));

    let pong = pending.wait().await.expect("pong");
    assert_eq!(pong.message_type(), "pong");
    assert_eq!(pong.sender_identity(), "server-1");
    let body: Pong = JsonCodec.decode(pong.payload()).expect("decode pong");
    assert_eq!(body, Pong { seq: 1 });
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.stats().resolved, 1);
}

#[tokio::test]
async fn unknown_type_is_unroutable() {
    init_tracing();
    let server = server();

    let err = server
        .route(Envelope::new("unknown-op", "t-42", Bytes::new(), "peer-7"))
        .await
        .expect_err("no handler");

    match err {
        RouterError::UnroutableMessage {
            message_type,
            correlation_token,
            sender_identity,
        } => {
            assert_eq!(message_type, "unknown-op");
            assert_eq!(correlation_token, "t-42");
            assert_eq!(sender_identity, "peer-7");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_removes_entry_and_late_reply_is_unsolicited() {
    init_tracing();
    let client = client(RouterConfig::new("peer-7"));

    let (request, pending) = client
        .request("ping", ping_payload(2))
        .with_token("xyz")
        .with_timeout(Duration::from_millis(100))
        .register()
        .expect("register");

    assert_eq!(pending.wait().await, Err(ReplyError::Timeout));
    assert!(!client.is_pending(&CorrelationToken::from("xyz")));
    assert_eq!(client.stats().expired, 1);

    let late = Envelope::reply_to(&request, "pong", Bytes::new(), "server-1");
    let err = client.route(late).await.expect_err("late reply");
    assert!(err.is_unroutable());
    assert_eq!(client.stats().resolved, 0);
}

#[tokio::test(start_paused = true)]
async fn reply_before_deadline_wins() {
    let client = client(RouterConfig::new("peer-7"));
    let (request, pending) = client
        .request("ping", ping_payload(3))
        .with_timeout(Duration::from_millis(100))
        .register()
        .expect("register");

    let responder = client.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        let reply = Envelope::reply_to(&request, "pong", Bytes::new(), "server-1");
        responder.route(reply).await.expect("resolve");
    });

    let reply = pending.wait().await.expect("reply in time");
    assert_eq!(reply.message_type(), "pong");
    assert_eq!(client.stats().expired, 0);
}

#[tokio::test(start_paused = true)]
async fn callbacks_expire_through_sweep() {
    let client = client(RouterConfig::new("peer-7"));
    let (tx, rx) = oneshot::channel();

    client
        .request("ping", ping_payload(4))
        .with_timeout(Duration::from_millis(100))
        .on_reply(move |result| {
            let _ = tx.send(result);
        })
        .expect("register");

    assert_eq!(client.sweep_expired(), 0);
    tokio::time::advance(Duration::from_millis(150)).await;
    assert_eq!(client.sweep_expired(), 1);

    assert_eq!(rx.await.expect("callback ran"), Err(ReplyError::Timeout));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sweeper_task_expires_callbacks() {
    let client = client(RouterConfig::new("peer-7"));
    let sweeper = client.spawn_sweeper(Duration::from_millis(10));
    let (tx, rx) = oneshot::channel();

    client
        .request("ping", ping_payload(5))
        .with_timeout(Duration::from_millis(50))
        .on_reply(move |result| {
            let _ = tx.send(result);
        })
        .expect("register");

    assert_eq!(rx.await.expect("callback ran"), Err(ReplyError::Timeout));

    client.shutdown();
    sweeper.await.expect("sweeper exits after shutdown");
}

#[tokio::test]
async fn callback_receives_reply() {
    let client = client(RouterConfig::new("peer-7"));
    let (tx, rx) = oneshot::channel();

    let request = client
        .request("ping", ping_payload(6))
        .on_reply(move |result| {
            let _ = tx.send(result);
        })
        .expect("register");

    let reply = Envelope::reply_to(&request, "pong", &b"ok"[..], "server-1");
    client.route(reply.clone()).await.expect("resolve");

    assert_eq!(rx.await.expect("callback ran"), Ok(reply));
}

#[tokio::test]
async fn shutdown_fails_pending_and_rejects_new_requests() {
    let client = client(RouterConfig::new("peer-7"));
    let (_, pending) = client.request("ping", ping_payload(7)).register().expect("register");
    let (tx, rx) = oneshot::channel();
    client
        .request("ping", ping_payload(8))
        .on_reply(move |result| {
            let _ = tx.send(result);
        })
        .expect("register");

    assert_eq!(client.shutdown(), 2);
    assert!(client.is_closed());
    assert_eq!(pending.wait().await, Err(ReplyError::RouterClosed));
    assert_eq!(rx.await.expect("callback ran"), Err(ReplyError::RouterClosed));

    let err = client
        .request("ping", ping_payload(9))
        .register()
        .expect_err("closed");
    assert!(matches!(err, RouterError::Closed));
}

#[tokio::test]
async fn malformed_bytes_leave_pending_table_untouched() {
    init_tracing();
    let client = client(RouterConfig::new("peer-7"));
    let (_, pending) = client.request("ping", ping_payload(10)).register().expect("register");

    let err = client
        .route_bytes("server-1", &[0xff, 0xff, 0xff, 0xff])
        .await
        .expect_err("garbage");
    assert!(err.is_malformed());
    assert!(client.is_pending(pending.token()));
    assert_eq!(client.pending_count(), 1);
}

#[tokio::test]
async fn oversized_bytes_rejected_before_parsing() {
    let client = client(RouterConfig::new("peer-7").with_max_envelope_size(16));
    let wire = EnvelopeBatch::single(Envelope::new("ping", "t", vec![0u8; 64], "")).encode();

    let err = client.route_bytes("server-1", &wire).await.expect_err("too large");
    assert!(matches!(
        err,
        RouterError::MalformedEnvelope(courier_transport::EnvelopeError::TooLarge { max: 16, .. })
    ));
}

#[tokio::test]
async fn batch_elements_routed_in_order() {
    let server = server();
    let batch = EnvelopeBatch::new(vec![
        Envelope::new("ping", "a", ping_payload(1), "forged"),
        Envelope::new("unknown-op", "b", Bytes::new(), "forged"),
        Envelope::new("notify", "c", Bytes::new(), "forged"),
        Envelope::new("ping", "d", &b"{not json"[..], "forged"),
    ]);

    let results = server
        .route_bytes("peer-7", &batch.encode())
        .await
        .expect("decode");
    assert_eq!(results.len(), 4);

    match &results[0] {
        Ok(Routed::Replied { destination, reply }) => {
            assert_eq!(destination, "peer-7");
            assert_eq!(reply.correlation_token(), &CorrelationToken::from("a"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        &results[1],
        Err(RouterError::UnroutableMessage { sender_identity, .. }) if sender_identity == "peer-7"
    ));
    assert!(matches!(
        &results[2],
        Ok(Routed::Handled { message_type, .. }) if message_type == "notify"
    ));
    assert!(matches!(&results[3], Err(RouterError::PayloadRejected { .. })));
}

#[tokio::test]
async fn pending_limit_enforced() {
    let client = client(RouterConfig::new("peer-7").with_max_pending(2));
    let _first = client.request("ping", Bytes::new()).register().expect("first");
    let _second = client.request("ping", Bytes::new()).register().expect("second");

    let err = client
        .request("ping", Bytes::new())
        .register()
        .expect_err("full");
    assert!(matches!(err, RouterError::TooManyPending { limit: 2 }));
}

#[tokio::test]
async fn caller_token_must_be_unused() {
    let client = client(RouterConfig::new("peer-7"));
    let (_, _pending) = client
        .request("ping", Bytes::new())
        .with_token("abc123")
        .register()
        .expect("first");

    let err = client
        .request("ping", Bytes::new())
        .with_token("abc123")
        .register()
        .expect_err("token in use");
    assert!(matches!(err, RouterError::TokenInUse { token } if token == "abc123"));
}

#[test]
fn duplicate_handlers_fail_build() {
    let err = Router::builder(RouterConfig::default())
        .handler("ping", PingHandler)
        .handler("ping", Sink)
        .build()
        .expect_err("duplicate");
    assert_eq!(err.to_string(), "duplicate handler for message type \"ping\"");
}

#[tokio::test]
async fn stale_handle_cannot_abandon_reused_token() {
    let client = client(RouterConfig::new("peer-7"));

    let (first, first_pending) = client
        .request("ping", ping_payload(11))
        .with_token("t")
        .register()
        .expect("first");
    let first_reply = Envelope::reply_to(&first, "pong", &b"first"[..], "server-1");
    client.route(first_reply).await.expect("resolve first");

    let (second, second_pending) = client
        .request("ping", ping_payload(12))
        .with_token("t")
        .register()
        .expect("token free again");

    assert!(!first_pending.abandon());
    assert!(client.is_pending(&CorrelationToken::from("t")));

    let second_reply = Envelope::reply_to(&second, "pong", &b"second"[..], "server-1");
    let routed = client.route(second_reply.clone()).await.expect("resolve second");
    assert!(matches!(routed, Routed::Resolved { .. }));
    assert_eq!(second_pending.wait().await, Ok(second_reply));
    assert_eq!(client.stats().abandoned, 0);
}

#[tokio::test]
async fn stale_handle_drop_leaves_reused_token_alone() {
    let client = client(RouterConfig::new("peer-7"));

    let (first, first_pending) = client
        .request("ping", ping_payload(13))
        .with_token("t")
        .register()
        .expect("first");
    client
        .route(Envelope::reply_to(&first, "pong", Bytes::new(), "server-1"))
        .await
        .expect("resolve first");

    let (_, second_pending) = client
        .request("ping", ping_payload(14))
        .with_token("t")
        .register()
        .expect("token free again");

    drop(first_pending);
    assert!(client.is_pending(second_pending.token()));
}

#[tokio::test(start_paused = true)]
async fn sweeper_exits_when_router_dropped() {
    let client = client(RouterConfig::new("peer-7"));
    let sweeper = client.spawn_sweeper(Duration::from_millis(10));

    drop(client);
    sweeper.await.expect("sweeper exits once the router is gone");
}
