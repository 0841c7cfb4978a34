//! Gateway Integration Tests
//!
//! Drive the client against the mock gateway over real WebSockets.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use integration_tests::{
    fixtures::*, ClientFrame, GatewayConn, MockGateway, RECV_TIMEOUT,
};
use shardgate_client::{
    handler_fn, CommandError, ConnectionPhase, CoordinatorEvent, DispatchEvent, DispatchRouter,
    FatalRejection, GatewayCommand, OpCode, ShardCoordinator, WebSocketConnector,
};
use shardgate_client::protocol::CloseCode;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

fn coordinator(gateway: &MockGateway, shard_count: u32, router: DispatchRouter) -> ShardCoordinator {
    let config = test_config(&gateway.url(), shard_count).expect("valid test config");
    ShardCoordinator::new(config, Arc::new(WebSocketConnector), Arc::new(router))
}

/// Accept a socket and complete identify + READY for shard 0
async fn establish(
    gateway: &mut MockGateway,
    coordinator: &ShardCoordinator,
    session_id: &str,
) -> GatewayConn {
    let mut conn = gateway.accept().await.unwrap();
    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    conn.expect_op(OpCode::Identify).await.unwrap();
    conn.send(&ready(session_id, &gateway.resume_url())).unwrap();
    wait_connected(coordinator, 0).await;
    conn
}

async fn wait_connected(coordinator: &ShardCoordinator, shard_id: u32) {
    timeout(
        RECV_TIMEOUT,
        coordinator
            .shard(shard_id)
            .unwrap()
            .wait_for_phase(ConnectionPhase::Connected),
    )
    .await
    .expect("shard did not connect")
    .unwrap();
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_identify_handshake() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = gateway.accept().await.unwrap();
    assert_eq!(conn.uri, "/gateway?v=10&encoding=json");

    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    let identify = conn.expect_op(OpCode::Identify).await.unwrap();
    assert_eq!(identify.d["token"], TEST_TOKEN);
    assert_eq!(identify.d["intents"], 513);
    assert_eq!(identify.d["shard"], serde_json::json!([0, 1]));
    assert!(identify.d["properties"]["os"].is_string());

    conn.send(&ready("session-a", &gateway.resume_url())).unwrap();
    wait_connected(&coordinator, 0).await;

    let status = coordinator.registry().get(0).unwrap();
    assert_eq!(
        status.session.unwrap().session_id.as_deref(),
        Some("session-a")
    );
    assert!(coordinator.health().all_connected());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_heartbeats_carry_sequence_and_record_latency() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = establish(&mut gateway, &coordinator, "session-a").await;
    conn.send(&message_create(2, "hello")).unwrap();

    // A heartbeat may already have gone out before the dispatch arrived
    loop {
        let heartbeat = match conn.recv().await.unwrap() {
            ClientFrame::Envelope(envelope) => envelope,
            ClientFrame::Close(code) => panic!("unexpected close {code:?}"),
        };
        assert_eq!(heartbeat.op, OpCode::Heartbeat);
        conn.send(&shardgate_client::Envelope::heartbeat_ack()).unwrap();
        if heartbeat.d == serde_json::json!(2) {
            break;
        }
        assert_eq!(heartbeat.d, serde_json::json!(1));
    }

    timeout(RECV_TIMEOUT, async {
        while coordinator.registry().get(0).unwrap().latency_ms.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("latency never recorded");

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shards_identify_one_at_a_time() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 2, DispatchRouter::new());
    let _events = coordinator.start();

    let mut first = gateway.accept().await.unwrap();
    let mut second = gateway.accept().await.unwrap();
    first.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    second.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();

    let (a, b) = tokio::join!(
        async {
            let identify = first.expect_op(OpCode::Identify).await.unwrap();
            (identify.d["shard"][0].as_u64(), Instant::now())
        },
        async {
            let identify = second.expect_op(OpCode::Identify).await.unwrap();
            (identify.d["shard"][0].as_u64(), Instant::now())
        },
    );

    let mut shards = vec![a.0, b.0];
    shards.sort_unstable();
    assert_eq!(shards, vec![Some(0), Some(1)]);

    let spacing = if a.1 > b.1 { a.1 - b.1 } else { b.1 - a.1 };
    assert!(spacing >= Duration::from_millis(280), "identifies {spacing:?} apart");

    coordinator.shutdown().await;
}

// ============================================================================
// Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_resume_after_server_close() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = establish(&mut gateway, &coordinator, "session-a").await;
    conn.send(&message_create(2, "one")).unwrap();
    conn.send(&message_create(3, "two")).unwrap();
    conn.close(4000, "Unknown error").unwrap();
    assert_eq!(conn.expect_close().await.unwrap(), Some(4000));

    let mut conn = gateway.accept().await.unwrap();
    assert_eq!(conn.uri, "/resume?v=10&encoding=json");
    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();

    let resume = conn.expect_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["token"], TEST_TOKEN);
    assert_eq!(resume.d["session_id"], "session-a");
    assert_eq!(resume.d["seq"], 3);

    conn.send(&shardgate_client::Envelope::dispatch(
        "RESUMED",
        4,
        serde_json::json!({}),
    ))
    .unwrap();
    wait_connected(&coordinator, 0).await;
    assert_eq!(coordinator.registry().get(0).unwrap().reconnect_attempts, 0);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_abrupt_disconnect_resumes() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let conn = establish(&mut gateway, &coordinator, "session-a").await;
    drop(conn);

    let mut conn = gateway.accept().await.unwrap();
    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    let resume = conn.expect_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], "session-a");

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_invalid_session_reidentifies() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = establish(&mut gateway, &coordinator, "session-a").await;
    conn.send(&shardgate_client::Envelope::invalid_session(false)).unwrap();
    assert_eq!(conn.expect_close().await.unwrap(), Some(4000));

    let mut conn = gateway.accept().await.unwrap();
    assert_eq!(conn.uri, "/gateway?v=10&encoding=json");
    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    conn.expect_op(OpCode::Identify).await.unwrap();

    conn.send(&ready("session-b", &gateway.resume_url())).unwrap();
    wait_connected(&coordinator, 0).await;

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_missed_ack_forces_reconnect() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = establish(&mut gateway, &coordinator, "session-a").await;

    // Never acknowledge: the second tick gives up on the socket
    assert_eq!(conn.expect_close().await.unwrap(), Some(4000));

    let mut conn = gateway.accept().await.unwrap();
    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    conn.expect_op(OpCode::Resume).await.unwrap();

    let status = coordinator.registry().get(0).unwrap();
    assert!(status.last_disconnect.is_some());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_fatal_close_is_escalated() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let mut events = coordinator.start();

    let mut conn = gateway.accept().await.unwrap();
    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    conn.expect_op(OpCode::Identify).await.unwrap();
    conn.close(4004, "Authentication failed").unwrap();

    let event = timeout(RECV_TIMEOUT, events.recv()).await.unwrap();
    assert_eq!(
        event,
        Some(CoordinatorEvent::ShardFatal {
            shard_id: 0,
            rejection: FatalRejection::Rejected {
                code: CloseCode::AuthenticationFailed
            },
        })
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(gateway.try_accept().is_none());
    assert_eq!(coordinator.health().fatally_closed, 1);
}

#[tokio::test]
async fn test_struggling_shard_is_escalated() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let mut events = coordinator.start();

    // Drop every socket before hello
    let drops = tokio::spawn(async move {
        loop {
            match gateway.accept().await {
                Ok(conn) => drop(conn),
                Err(_) => break,
            }
        }
    });

    let event = timeout(RECV_TIMEOUT, events.recv()).await.unwrap().unwrap();
    match event {
        CoordinatorEvent::ShardStruggling {
            shard_id, attempts, ..
        } => {
            assert_eq!(shard_id, 0);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected event {other:?}"),
    }

    coordinator.shutdown().await;
    drops.abort();
}

// ============================================================================
// Dispatch and Command Tests
// ============================================================================

#[tokio::test]
async fn test_dispatches_reach_handlers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let router = DispatchRouter::new();
    router.register(
        "MESSAGE_CREATE",
        handler_fn(move |event: DispatchEvent| {
            let tx = tx.clone();
            async move {
                tx.send((event.shard.id, event.sequence, event.data["content"].clone()))?;
                Ok(())
            }
        }),
    );

    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, router);
    let _events = coordinator.start();

    let conn = establish(&mut gateway, &coordinator, "session-a").await;
    conn.send(&message_create(2, "first")).unwrap();
    conn.send(&message_create(3, "second")).unwrap();

    let first = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, (0, Some(2), serde_json::json!("first")));
    assert_eq!(second, (0, Some(3), serde_json::json!("second")));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_presence_update_reaches_gateway() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = gateway.accept().await.unwrap();
    let shard = coordinator.shard(0).unwrap();
    let early = shard
        .send(GatewayCommand::UpdatePresence(presence("online")))
        .await;
    assert!(matches!(early, Err(CommandError::NotConnected)));

    conn.send_hello(HEARTBEAT_INTERVAL_MS).unwrap();
    conn.expect_op(OpCode::Identify).await.unwrap();
    conn.send(&ready("session-a", &gateway.resume_url())).unwrap();
    wait_connected(&coordinator, 0).await;

    shard
        .send(GatewayCommand::UpdatePresence(presence("dnd")))
        .await
        .unwrap();
    let update = conn.expect_op(OpCode::PresenceUpdate).await.unwrap();
    assert_eq!(update.d["status"], "dnd");

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_normally() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut coordinator = coordinator(&gateway, 1, DispatchRouter::new());
    let _events = coordinator.start();

    let mut conn = establish(&mut gateway, &coordinator, "session-a").await;
    coordinator.shutdown().await;

    assert_eq!(conn.expect_close().await.unwrap(), Some(1000));
    assert_eq!(
        coordinator.shard(0).unwrap().phase(),
        ConnectionPhase::FatallyClosed
    );
    assert!(gateway.try_accept().is_none());
}

#[test]
fn test_config_requires_token() {
    let mut env = test_env("ws://127.0.0.1:1/gateway", 1);
    env.remove("GATEWAY_TOKEN");
    assert!(config_from_env(&env).is_err());

    let env = test_env("ws://127.0.0.1:1/gateway", 4);
    let config = config_from_env(&env).unwrap();
    assert_eq!(config.shard_count, 4);
    assert_eq!(config.identify_interval, Duration::from_millis(300));
}
