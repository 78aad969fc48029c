use echoprobe::common::test_utils::{
    PeerMode, RecordedEvent, RecordingObserver, StubResponse, spawn_http_stub, spawn_ws_peer,
    unused_addr,
};
use echoprobe::websocket::{Payload, SessionState};
use echoprobe::{
    ConnectionError, RequestErrorKind, RequestProbe, RequestProbeConfig, StreamEchoProbe,
    StreamProbeConfig,
};
use http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn stream_probe(uri: &str, observer: &Arc<RecordingObserver>) -> StreamEchoProbe {
    StreamEchoProbe::new(uri.parse().unwrap())
        .unwrap()
        .with_config(
            StreamProbeConfig::default()
                .with_connect_timeout(Duration::from_secs(5))
                .with_read_timeout(Duration::from_secs(5)),
        )
        .with_observer(observer.clone())
}

fn request_probe(uri: &str, observer: &Arc<RecordingObserver>) -> RequestProbe {
    RequestProbe::new(uri.parse().unwrap())
        .unwrap()
        .with_config(RequestProbeConfig::default().with_timeout(Duration::from_secs(5)))
        .with_observer(observer.clone())
}

#[tokio::test]
async fn test_ping_round_trip_before_close() {
    let mut peer = spawn_ws_peer(PeerMode::Echo).await.unwrap();
    let observer = Arc::new(RecordingObserver::new());
    let mut session = stream_probe(&peer.ws_uri("/ws"), &observer)
        .connect()
        .await
        .unwrap();

    let echoed = session.round_trip("ping").await.unwrap();
    assert_eq!(echoed.as_text(), Some("ping"));
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(peer.received.recv().await, Some(Payload::from("ping")));

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    peer.task.await.unwrap().unwrap();

    // the verified echo must be reported before the session leaves Open
    let events = observer.events();
    let echoed_at = events
        .iter()
        .position(|e| matches!(e, RecordedEvent::Verified(_)))
        .unwrap();
    let closed_at = events
        .iter()
        .position(|e| {
            matches!(
                e,
                RecordedEvent::Transition {
                    to: SessionState::Closed,
                    ..
                }
            )
        })
        .unwrap();
    assert!(echoed_at < closed_at);
}

#[tokio::test]
async fn test_unreachable_ws_endpoint_yields_no_session() {
    let addr = unused_addr().await.unwrap();
    let observer = Arc::new(RecordingObserver::new());

    let err = stream_probe(&format!("ws://{addr}/ws"), &observer)
        .connect()
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectionError::Unreachable { .. }));
    assert_eq!(
        observer.transitions(),
        vec![(SessionState::Connecting, SessionState::Errored)]
    );
    assert!(
        observer
            .events()
            .iter()
            .any(|e| matches!(e, RecordedEvent::ConnectFailed(_)))
    );
}

#[tokio::test]
async fn test_server_initiated_exchange() {
    let script = vec![Payload::from("hello"), Payload::from("world")];
    let mut peer = spawn_ws_peer(PeerMode::Script(script.clone())).await.unwrap();
    let observer = Arc::new(RecordingObserver::new());
    let mut session = stream_probe(&peer.ws_uri("/chat?room=1"), &observer)
        .connect()
        .await
        .unwrap();

    assert_eq!(session.run_echo_loop().await.unwrap(), 2);
    assert_eq!(session.state(), SessionState::Closed);

    let mut bounced = Vec::new();
    while let Some(payload) = peer.received.recv().await {
        bounced.push(payload);
    }
    assert_eq!(bounced, script);
    peer.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_request_success_matches_body() {
    let (stub, addr) = spawn_http_stub(StubResponse::json(200, r#"{"hello":"dsad"}"#))
        .await
        .unwrap();
    let observer = Arc::new(RecordingObserver::new());

    let outcome = request_probe(&format!("http://{addr}/api/sdsad"), &observer)
        .send(&json!({"hello": "dsad"}))
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.body(), Some(outcome.request_body()));
    assert_eq!(outcome.status(), Some(StatusCode::OK));
    stub.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_request_not_found() {
    let (stub, addr) = spawn_http_stub(StubResponse::json(404, "{}")).await.unwrap();
    let observer = Arc::new(RecordingObserver::new());

    let outcome = request_probe(&format!("http://{addr}/api/sdsad"), &observer)
        .send(&json!({"hello": "dsad"}))
        .await;

    assert_eq!(outcome.error_kind(), Some(RequestErrorKind::HttpStatus));
    assert!(outcome.body().is_none());
    assert_eq!(
        outcome.error().unwrap().to_string(),
        "HTTP error! Status: 404 Not Found"
    );
    stub.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_request_non_json_response() {
    let (stub, addr) = spawn_http_stub(StubResponse::new(200, "<html></html>"))
        .await
        .unwrap();
    let observer = Arc::new(RecordingObserver::new());

    let outcome = request_probe(&format!("http://{addr}/api/sdsad"), &observer)
        .send(&json!({"hello": "dsad"}))
        .await;

    assert_eq!(outcome.error_kind(), Some(RequestErrorKind::Decode));
    assert!(outcome.body().is_none());
    stub.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_both_probes_share_one_observer() {
    let mut peer = spawn_ws_peer(PeerMode::Echo).await.unwrap();
    let (stub, addr) = spawn_http_stub(StubResponse::json(200, "{}")).await.unwrap();
    let observer = Arc::new(RecordingObserver::new());

    let mut session = stream_probe(&peer.ws_uri("/ws"), &observer)
        .connect()
        .await
        .unwrap();
    let outcome = request_probe(&format!("http://{addr}/"), &observer)
        .send(&json!({"hello": "dsad"}))
        .await;
    session.round_trip("ping").await.unwrap();
    session.close().await;

    assert!(outcome.is_success());
    assert_eq!(peer.received.recv().await, Some(Payload::from("ping")));
    let events = observer.events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RecordedEvent::Outcome { success: true, .. }))
    );
    assert!(events.iter().any(|e| matches!(e, RecordedEvent::Verified(_))));
    stub.await.unwrap().unwrap();
    peer.task.await.unwrap().unwrap();
}
