//! Integration tests for the live sync server
//!
//! Starts a real server on an ephemeral port and talks to it with the
//! observer client and a raw WebSocket connection.

use std::sync::Arc;
use std::time::Duration;

use super::common::fixtures::{login_error_page, login_page};
use axscope::sync::{ObserverConfig, ObserverHandle};
use axscope::{
    spawn_observer, HubConfig, MockCaptureSource, ObserverEvent, ServerConfig, SyncHub,
    SyncMessage, SyncServer,
};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

type RawSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> (Arc<MockCaptureSource>, SyncServer) {
    let source = Arc::new(MockCaptureSource::new(Some(login_page("Sign in"))));
    let hub = SyncHub::new(
        source.clone(),
        HubConfig {
            // keep the poll loop out of the way; tests refresh explicitly
            poll_interval: Duration::from_secs(3600),
            ..HubConfig::default()
        },
    );
    let mut server = SyncServer::new(
        hub,
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        },
    );
    server.start().await.unwrap();
    (source, server)
}

fn observe(server: &SyncServer) -> ObserverHandle {
    spawn_observer(ObserverConfig {
        url: server.ws_url().unwrap(),
        reconnect_delay: Duration::from_millis(100),
    })
}

/// Wait for the first message matching `pred`, skipping everything else.
async fn expect_message<F>(observer: &mut ObserverHandle, mut pred: F) -> SyncMessage
where
    F: FnMut(&SyncMessage) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match observer.recv().await {
                Some(ObserverEvent::Message(message)) if pred(&message) => return message,
                Some(_) => continue,
                None => panic!("observer closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

async fn next_json(ws: &mut RawSocket) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Test that an observer gets connected + snapshot on attach
#[tokio::test]
async fn test_observer_receives_connected_then_snapshot() {
    let (_source, mut server) = start_server().await;
    let mut observer = observe(&server);

    let first = tokio::time::timeout(WAIT, observer.recv()).await.unwrap();
    assert_eq!(first, Some(ObserverEvent::Connected));

    let mut messages = Vec::new();
    for _ in 0..2 {
        match tokio::time::timeout(WAIT, observer.recv()).await.unwrap() {
            Some(ObserverEvent::Message(message)) => messages.push(message),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(messages[0], SyncMessage::Connected);
    assert_eq!(
        messages[1],
        SyncMessage::Snapshot {
            tree: login_page("Sign in"),
            changed_node_ids: None,
        }
    );

    observer.shutdown().await;
    server.stop().await.unwrap();
}

/// Test that every observer sees a change as a snapshot with changed ids
#[tokio::test]
async fn test_change_is_broadcast_to_all_observers() {
    let (source, mut server) = start_server().await;
    let mut first = observe(&server);
    let mut second = observe(&server);
    for observer in [&mut first, &mut second] {
        expect_message(observer, |m| matches!(m, SyncMessage::Snapshot { .. })).await;
    }

    source.push_tree(login_page("Continue")).await;

    for observer in [&mut first, &mut second] {
        let message = expect_message(observer, |m| {
            matches!(m, SyncMessage::Snapshot { changed_node_ids: Some(_), .. })
        })
        .await;
        assert_eq!(
            message,
            SyncMessage::Snapshot {
                tree: login_page("Continue"),
                changed_node_ids: Some(vec![5]),
            }
        );
    }

    first.shutdown().await;
    second.shutdown().await;
    server.stop().await.unwrap();
}

/// Test a full recording session driven by observer commands
#[tokio::test]
async fn test_recording_commands_over_websocket() {
    let (source, mut server) = start_server().await;
    let mut observer = observe(&server);
    expect_message(&mut observer, |m| matches!(m, SyncMessage::Snapshot { .. })).await;

    observer.send(SyncMessage::StartRecording).await.unwrap();
    expect_message(&mut observer, |m| {
        matches!(m, SyncMessage::RecordingStatus(s) if s.is_recording)
    })
    .await;

    observer.send(SyncMessage::StartRecording).await.unwrap();
    let error = expect_message(&mut observer, |m| matches!(m, SyncMessage::Error { .. })).await;
    assert_eq!(
        error,
        SyncMessage::error("a recording session is already active")
    );

    source.push_tree(login_error_page()).await;
    expect_message(&mut observer, |m| {
        matches!(m, SyncMessage::RecordingStatus(s) if s.timeline_length == 1)
    })
    .await;

    observer.send(SyncMessage::StopRecording).await.unwrap();
    let stopped = expect_message(&mut observer, |m| {
        matches!(m, SyncMessage::RecordingStopped { .. })
    })
    .await;
    let SyncMessage::RecordingStopped { recording } = stopped else {
        unreachable!()
    };
    assert_eq!(recording.initial_snapshot.tree, login_page("Sign in"));
    assert_eq!(
        axscope::reconstruct_at(&recording, 0).unwrap(),
        login_error_page()
    );

    observer.shutdown().await;
    server.stop().await.unwrap();
}

/// Test that bad input gets an error reply on that socket only
#[tokio::test]
async fn test_invalid_messages_get_error_replies() {
    let (source, mut server) = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_url().unwrap())
        .await
        .unwrap();

    assert_eq!(next_json(&mut ws).await["type"], "connected");
    assert_eq!(next_json(&mut ws).await["type"], "snapshot");

    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"highlight","backendNodeId":99}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"highlight","backendNodeId":5}"#.into()))
        .await
        .unwrap();

    let replies = [next_json(&mut ws).await, next_json(&mut ws).await];
    assert_eq!(replies[0]["type"], "error");
    assert!(replies[0]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message"));
    assert_eq!(replies[1]["type"], "error");
    assert_eq!(
        replies[1]["message"],
        "node 99 is not present in the current tree"
    );

    // the valid highlight reached the capture source
    tokio::time::timeout(WAIT, async {
        while source.highlights().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(source.highlights(), vec![Some(5)]);

    let _ = ws.close(None).await;
    server.stop().await.unwrap();
}

/// Test that the observer reports the drop when the server goes away
#[tokio::test]
async fn test_observer_sees_disconnect_on_server_stop() {
    let (_source, mut server) = start_server().await;
    let mut observer = observe(&server);
    expect_message(&mut observer, |m| matches!(m, SyncMessage::Snapshot { .. })).await;

    server.stop().await.unwrap();

    let event = tokio::time::timeout(WAIT, async {
        loop {
            match observer.recv().await {
                Some(ObserverEvent::Disconnected { reason }) => return reason,
                Some(_) => continue,
                None => panic!("observer closed"),
            }
        }
    })
    .await
    .unwrap();
    assert!(!event.is_empty());
    observer.shutdown().await;
}
