//! End-to-end session flow through the gateway, on the synthetic backend.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use termhub_daemon::access::{AccessGate, StaticDirectory};
use termhub_daemon::gateway::{ClientConnection, Gateway, GatewayError};
use termhub_daemon::persist::{NullStore, PersistenceBridge};
use termhub_daemon::process::FallbackBackend;
use termhub_daemon::session::{AttachGrant, RegistryConfig, SessionEvent, SessionRegistry};
use termhub_proto::{ParticipantRole, StoredRole};

fn stack() -> Gateway {
    let mut dir = StaticDirectory::new();
    dir.add_member("demo", "alice", StoredRole::Owner);
    dir.add_member("demo", "bob", StoredRole::Viewer);
    dir.add_member("demo", "carol", StoredRole::Operator);

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(FallbackBackend::new()),
        PersistenceBridge::new(Arc::new(NullStore)),
        RegistryConfig::default(),
    ));
    Gateway::new(registry, AccessGate::new(Arc::new(dir)))
}

/// Read live output until `needle` has been seen, returning everything read.
async fn output_until(grant: &mut AttachGrant, needle: &str) -> String {
    let mut seen = String::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), grant.events.recv())
            .await
            .expect("output before timeout")
            .expect("event channel open");
        match event {
            SessionEvent::Output(text) => {
                seen.push_str(&text);
                if seen.contains(needle) {
                    return seen;
                }
            }
            SessionEvent::Exit { exit_code } => panic!("unexpected exit: {exit_code}"),
        }
    }
}

async fn expect_exit(grant: &mut AttachGrant) -> i32 {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), grant.events.recv())
            .await
            .expect("exit before timeout")
            .expect("event channel open");
        if let SessionEvent::Exit { exit_code } = event {
            return exit_code;
        }
    }
}

#[tokio::test]
async fn two_client_session_lifecycle() {
    let gw = stack();

    // A joins first: fresh session, nothing to catch up on.
    let mut conn_a = ClientConnection::new("alice");
    let mut joined_a = gw.join(&mut conn_a, "demo").await.unwrap();
    assert_eq!(joined_a.role, ParticipantRole::Drive);
    assert!(joined_a.grant.replay.is_empty());

    output_until(&mut joined_a.grant, "ready").await;

    // A drives; the echo and the response come back as output.
    gw.input(&conn_a, "echo hi\n").await.unwrap();
    output_until(&mut joined_a.grant, "ok").await;

    // B joins late and receives everything so far as replay, atomically.
    let mut conn_b = ClientConnection::new("bob");
    let mut joined_b = gw.join(&mut conn_b, "demo").await.unwrap();
    assert_eq!(joined_b.role, ParticipantRole::Observe);
    assert!(joined_b.grant.replay.contains("ready"));
    assert!(joined_b.grant.replay.contains("echo hi"));
    assert!(joined_b.grant.replay.contains("ok"));

    // B cannot drive.
    assert!(matches!(
        gw.input(&conn_b, "whoami\n").await,
        Err(GatewayError::PermissionDenied)
    ));

    // Live output reaches both, exactly once each.
    gw.input(&conn_a, "x").await.unwrap();
    assert_eq!(output_until(&mut joined_a.grant, "x").await, "x");
    assert_eq!(output_until(&mut joined_b.grant, "x").await, "x");

    // Kill: every attached client sees the exit.
    gw.registry().kill("demo", None).await.unwrap();
    assert_eq!(expect_exit(&mut joined_a.grant).await, 0);
    assert_eq!(expect_exit(&mut joined_b.grant).await, 0);
    conn_a.clear_attachment();
    conn_b.clear_attachment();

    // Rejoining starts a fresh process with an empty buffer.
    for _ in 0..200 {
        if !gw.registry().exists("demo").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let mut rejoined = gw.join(&mut conn_a, "demo").await.unwrap();
    assert!(rejoined.grant.replay.is_empty());
    output_until(&mut rejoined.grant, "ready").await;
}

#[tokio::test]
async fn disconnect_does_not_disturb_other_clients() {
    let gw = stack();

    let mut conn_a = ClientConnection::new("alice");
    let mut conn_c = ClientConnection::new("carol");
    let mut joined_a = gw.join(&mut conn_a, "demo").await.unwrap();
    let mut joined_c = gw.join(&mut conn_c, "demo").await.unwrap();
    assert_eq!(joined_c.role, ParticipantRole::Drive);

    output_until(&mut joined_a.grant, "ready").await;
    output_until(&mut joined_c.grant, "ready").await;

    // A drops; the session and C's stream carry on.
    gw.disconnect(&mut conn_a).await;
    assert!(gw.registry().exists("demo").await);

    gw.input(&conn_c, "ping\n").await.unwrap();
    output_until(&mut joined_c.grant, "ok").await;
}

#[tokio::test]
async fn denied_user_never_creates_a_session() {
    let gw = stack();
    let mut conn = ClientConnection::new("mallory");

    assert!(matches!(
        gw.join(&mut conn, "demo").await,
        Err(GatewayError::AccessDenied { .. })
    ));
    assert!(!gw.registry().exists("demo").await);
}
