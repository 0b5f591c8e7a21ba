//! Reconnecting WebSocket observer client.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::SyncMessage;
use crate::error::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// WebSocket endpoint of the sync server.
    pub url: String,
    /// Fixed wait between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9322/ws".to_string(),
            reconnect_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    Connected,
    Message(SyncMessage),
    /// The connection dropped or could not be established; a reconnect is
    /// scheduled.
    Disconnected { reason: String },
}

/// Handle to a running observer task.
pub struct ObserverHandle {
    events: mpsc::Receiver<ObserverEvent>,
    commands: mpsc::Sender<SyncMessage>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// Next event, or `None` after shutdown.
    pub async fn recv(&mut self) -> Option<ObserverEvent> {
        self.events.recv().await
    }

    /// Queues a command for the server. Commands sent while disconnected
    /// are delivered after the next successful connect.
    pub async fn send(&self, command: SyncMessage) -> Result<()> {
        if !command.is_command() {
            return Err(Error::UnsupportedCommand(command.kind().to_string()));
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Channel("observer task has exited".to_string()))
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "observer task ended abnormally");
        }
    }
}

/// Connects to `config.url` in the background and keeps reconnecting until
/// the handle is shut down.
pub fn spawn_observer(config: ObserverConfig) -> ObserverHandle {
    let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let token = CancellationToken::new();
    let task = tokio::spawn(observer_loop(config, event_tx, command_rx, token.clone()));
    ObserverHandle {
        events,
        commands,
        token,
        task,
    }
}

async fn observer_loop(
    config: ObserverConfig,
    events: mpsc::Sender<ObserverEvent>,
    mut commands: mpsc::Receiver<SyncMessage>,
    token: CancellationToken,
) {
    loop {
        let reason = tokio::select! {
            _ = token.cancelled() => return,
            reason = run_connection(&config, &events, &mut commands, &token) => reason,
        };
        if token.is_cancelled() {
            return;
        }
        tracing::info!(url = %config.url, %reason, "observer disconnected, reconnecting");
        if events
            .send(ObserverEvent::Disconnected { reason })
            .await
            .is_err()
        {
            return;
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
}

/// One connection lifetime. Returns why it ended.
async fn run_connection(
    config: &ObserverConfig,
    events: &mpsc::Sender<ObserverEvent>,
    commands: &mut mpsc::Receiver<SyncMessage>,
    token: &CancellationToken,
) -> String {
    let (ws, _) = match connect_async(config.url.as_str()).await {
        Ok(value) => value,
        Err(err) => return format!("connect failed: {err}"),
    };
    tracing::info!(url = %config.url, "observer connected");
    if events.send(ObserverEvent::Connected).await.is_err() {
        token.cancel();
        return "event receiver dropped".to_string();
    }

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = sink.close().await;
                return "shutdown".to_string();
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = sink.close().await;
                    return "command sender dropped".to_string();
                };
                let json = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize command");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(json.into())).await {
                    return format!("send failed: {err}");
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SyncMessage>(text.as_str()) {
                        Ok(message) => {
                            if events.send(ObserverEvent::Message(message)).await.is_err() {
                                token.cancel();
                                return "event receiver dropped".to_string();
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "ignoring unparseable message");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(err)) => return format!("receive failed: {err}"),
            }
        }
    }
}
