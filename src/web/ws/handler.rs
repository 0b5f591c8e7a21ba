//! WebSocket connection handler for live tree observers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sync::{Attachment, SyncHub, SyncMessage};

const OUTBOUND_CAPACITY: usize = 256;

/// Serve one observer: initial messages, then hub broadcasts, while
/// executing the commands it sends. Command errors are answered with an
/// `error` message to this observer only.
pub async fn handle_websocket(socket: WebSocket, hub: Arc<SyncHub>, shutdown: CancellationToken) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to the WebSocket
    let (tx, mut rx) = mpsc::channel::<SyncMessage>(OUTBOUND_CAPACITY);

    // Spawn task to forward messages to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let Attachment {
        initial,
        mut receiver,
    } = hub.attach().await;
    for message in initial {
        if tx.send(message).await.is_err() {
            return;
        }
    }

    // Forward hub broadcasts; a lagging observer skips what it missed.
    let broadcast_tx = tx.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    if broadcast_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "observer lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Handle incoming messages
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = ws_receiver.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
        };

        let reply = match serde_json::from_str::<SyncMessage>(text.as_str()) {
            Ok(command) => match hub.handle_command(command).await {
                Ok(()) => None,
                Err(err) => Some(SyncMessage::error(err.to_string())),
            },
            Err(e) => Some(SyncMessage::error(format!("Invalid message: {}", e))),
        };
        if let Some(reply) = reply {
            if let Err(send_err) = tx.send(reply).await {
                tracing::debug!(error = ?send_err, "Failed to send error reply");
                break;
            }
        }
    }

    forward_task.abort();
    drop(tx);
    let _ = send_task.await;
    tracing::debug!("observer detached");
}
