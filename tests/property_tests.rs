use echoprobe::common::NullObserver;
use echoprobe::common::test_utils::{PeerMode, StubResponse, spawn_http_stub, spawn_ws_peer};
use echoprobe::websocket::{Frame, FrameCodec, OpCode, Payload, SessionEvent, SessionState};
use echoprobe::{RequestProbe, StreamEchoProbe, StreamProbeConfig};
use bytes::BytesMut;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};

fn any_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        Just(SessionEvent::HandshakeAccepted),
        Just(SessionEvent::HandshakeRejected),
        Just(SessionEvent::PayloadReceived),
        Just(SessionEvent::TransportFault),
        Just(SessionEvent::RemoteClosed),
        Just(SessionEvent::CloseRequested),
    ]
}

fn any_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        ".{0,256}".prop_map(Payload::from),
        prop::collection::vec(any::<u8>(), 0..1024).prop_map(Payload::from),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: whatever the peer sends is bounced back unmodified
    #[test]
    fn echo_preserves_payloads(payloads in prop::collection::vec(any_payload(), 1..4)) {
        tokio_test::block_on(async {
            let mut peer = spawn_ws_peer(PeerMode::Script(payloads.clone())).await
                .map_err(|e| TestCaseError::fail(format!("Peer setup failed: {}", e)))?;

            let probe = StreamEchoProbe::new(peer.ws_uri("/ws").parse().unwrap())
                .unwrap()
                .with_config(StreamProbeConfig::default().with_read_timeout(Duration::from_secs(5)))
                .with_observer(Arc::new(NullObserver));
            let mut session = probe.connect().await
                .map_err(|e| TestCaseError::fail(format!("Connect failed: {}", e)))?;

            let echoed = session.run_echo_loop().await
                .map_err(|e| TestCaseError::fail(format!("Echo loop failed: {}", e)))?;
            prop_assert_eq!(echoed, payloads.len());
            prop_assert_eq!(session.state(), SessionState::Closed);

            for expected in &payloads {
                let bounced = peer.received.recv().await;
                prop_assert_eq!(bounced.as_ref(), Some(expected));
            }
            Ok(())
        })?;
    }

    /// Property: a close request always lands in Closed, and transport
    /// events never leave a terminal state
    #[test]
    fn state_machine_closure(events in prop::collection::vec(any_event(), 0..32)) {
        let mut state = SessionState::Connecting;
        for event in events {
            let next = state.on(event);
            if event == SessionEvent::CloseRequested {
                prop_assert_eq!(next, SessionState::Closed);
            } else if state.is_terminal() {
                prop_assert_eq!(next, state);
            }
            if next == SessionState::Open {
                prop_assert!(matches!(state, SessionState::Connecting | SessionState::Open));
            }
            state = next;
        }
    }

    /// Property: a client-encoded frame decodes to the same frame on the server side
    #[test]
    fn masked_frames_survive_the_codec(data in prop::collection::vec(any::<u8>(), 0..70_000)) {
        let mut client = FrameCodec::client(1 << 20);
        let mut server = FrameCodec::server(1 << 20);
        let mut wire = BytesMut::new();

        client.encode(Frame::new(OpCode::Binary, data.clone()), &mut wire).unwrap();
        let decoded = server.decode(&mut wire).unwrap().unwrap();

        prop_assert_eq!(decoded.opcode, OpCode::Binary);
        prop_assert!(decoded.fin);
        prop_assert_eq!(&decoded.payload[..], &data[..]);
        prop_assert!(wire.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    /// Property: the recorded duration covers the whole exchange
    #[test]
    fn outcome_duration_is_monotonic(delay_ms in 0u64..30) {
        tokio_test::block_on(async {
            let (stub, addr) = spawn_http_stub(StubResponse::json(200, "{}")).await
                .map_err(|e| TestCaseError::fail(format!("Stub setup failed: {}", e)))?;
            let probe = RequestProbe::new(format!("http://{addr}/api/sdsad").parse().unwrap())
                .unwrap()
                .with_observer(Arc::new(NullObserver));

            let before = tokio::time::Instant::now();
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let outcome = probe.send(&json!({"hello": "dsad"})).await;
            let total = before.elapsed();

            prop_assert!(outcome.is_success());
            prop_assert!(outcome.elapsed_ms() >= 0.0);
            prop_assert!(outcome.elapsed() <= total);
            stub.await.unwrap().unwrap();
            Ok(())
        })?;
    }
}
