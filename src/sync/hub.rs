use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SyncMessage;
use crate::capture::{CaptureNotification, CaptureSource};
use crate::config::Config;
use crate::diff::{canonically_equal, extract_changed_node_ids};
use crate::error::{Error, Result};
use crate::recorder::{Recorder, RecorderConfig, Recording, RecordingStatus, UserEvent};
use crate::tree::{validate_tree, NodeId, Snapshot, TreeNode};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub recorder: RecorderConfig,
    /// Fallback poll of the capture source.
    pub poll_interval: Duration,
    /// `recordingStatus` broadcast interval while recording.
    pub heartbeat_interval: Duration,
    /// Where stopped recordings are written; `None` disables autosave.
    pub autosave_dir: Option<PathBuf>,
    /// Broadcast buffer per observer before it starts lagging.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig::default(),
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(1),
            autosave_dir: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl HubConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            recorder: config.recorder.clone(),
            poll_interval: config.capture.poll_interval,
            heartbeat_interval: config.capture.heartbeat_interval,
            autosave_dir: config.autosave_dir.clone(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// What a single `refresh` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The capture source has no tree.
    NoTree,
    /// Canonically identical to the current tree; nothing was sent.
    Unchanged,
    /// A snapshot was broadcast. `recorded` is set when a timeline entry
    /// was appended.
    Changed {
        changed_node_ids: Vec<NodeId>,
        recorded: bool,
    },
}

/// Messages for a newly attached observer plus its broadcast subscription.
pub struct Attachment {
    pub initial: Vec<SyncMessage>,
    pub receiver: broadcast::Receiver<SyncMessage>,
}

struct HubState {
    current: Option<Snapshot>,
    recorder: Recorder,
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Single owner of the current tree and the recorder.
///
/// Every change trigger goes through [`SyncHub::refresh`], which holds the
/// state lock across fetch, diff, broadcast and record, so two triggers can
/// never diff against different baselines.
pub struct SyncHub {
    source: Arc<dyn CaptureSource>,
    state: Mutex<HubState>,
    tx: broadcast::Sender<SyncMessage>,
    config: HubConfig,
    running: parking_lot::Mutex<Option<Running>>,
}

impl SyncHub {
    pub fn new(source: Arc<dyn CaptureSource>, config: HubConfig) -> Arc<Self> {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Arc::new(Self {
            source,
            state: Mutex::new(HubState {
                current: None,
                recorder: Recorder::new(config.recorder.clone()),
            }),
            tx,
            config,
            running: parking_lot::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn broadcast(&self, message: SyncMessage) {
        // No receivers is not an error.
        let _ = self.tx.send(message);
    }

    pub async fn current_tree(&self) -> Option<TreeNode> {
        let state = self.state.lock().await;
        state.current.as_ref().map(|s| s.tree.clone())
    }

    pub async fn status(&self) -> RecordingStatus {
        self.state.lock().await.recorder.status()
    }

    /// Registers an observer. The initial messages are `connected`, then a
    /// `snapshot` of the current tree when one exists, then the recording
    /// status when a session is active.
    pub async fn attach(&self) -> Attachment {
        let mut state = self.state.lock().await;
        if state.current.is_none() {
            if let Err(err) = self.refresh_locked(&mut state).await {
                tracing::warn!(error = %err, "initial fetch for new observer failed");
            }
        }

        let receiver = self.tx.subscribe();
        let mut initial = vec![SyncMessage::Connected];
        if let Some(snapshot) = &state.current {
            initial.push(SyncMessage::Snapshot {
                tree: snapshot.tree.clone(),
                changed_node_ids: None,
            });
        }
        if state.recorder.is_recording() {
            initial.push(SyncMessage::RecordingStatus(state.recorder.status()));
        }
        tracing::debug!(observers = self.tx.receiver_count(), "observer attached");
        Attachment { initial, receiver }
    }

    /// Fetch, diff against the current tree, broadcast and record.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut HubState) -> Result<RefreshOutcome> {
        let Some(snapshot) = self.source.get_full_tree().await? else {
            return Ok(RefreshOutcome::NoTree);
        };
        if !validate_tree(&snapshot.tree) {
            return Err(Error::InvalidTree(format!(
                "captured tree rooted at {} failed validation",
                snapshot.tree.backend_node_id
            )));
        }

        let changed_node_ids: Option<Vec<NodeId>> = match &state.current {
            Some(prev) if canonically_equal(&prev.tree, &snapshot.tree) => {
                return Ok(RefreshOutcome::Unchanged);
            }
            Some(prev) => Some(
                extract_changed_node_ids(&prev.tree, &snapshot.tree)
                    .into_iter()
                    .collect(),
            ),
            None => None,
        };

        tracing::debug!(
            nodes = snapshot.flat_nodes.len(),
            changed = changed_node_ids.as_ref().map_or(0, Vec::len),
            "tree changed"
        );
        self.broadcast(SyncMessage::Snapshot {
            tree: snapshot.tree.clone(),
            changed_node_ids: changed_node_ids.clone(),
        });

        let recorded = if state.recorder.is_recording() {
            match state
                .recorder
                .record_tree_change(snapshot.tree.clone(), None)
            {
                Ok(entry) => entry.is_some(),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to record tree change");
                    false
                }
            }
        } else {
            false
        };
        state.current = Some(snapshot);
        if recorded {
            self.broadcast(SyncMessage::RecordingStatus(state.recorder.status()));
        }

        Ok(RefreshOutcome::Changed {
            changed_node_ids: changed_node_ids.unwrap_or_default(),
            recorded,
        })
    }

    /// Executes an observer command. Failures are returned to the caller,
    /// who reports them to that observer only.
    pub async fn handle_command(&self, message: SyncMessage) -> Result<()> {
        tracing::debug!(command = message.kind(), "handling command");
        match message {
            SyncMessage::Highlight { backend_node_id } => self.highlight(backend_node_id).await,
            SyncMessage::ClearHighlight => self.source.clear_highlight().await,
            SyncMessage::Refresh => self.refresh().await.map(|_| ()),
            SyncMessage::StartRecording => self.start_recording().await.map(|_| ()),
            SyncMessage::StopRecording => self.stop_recording().await.map(|_| ()),
            SyncMessage::RecordUserEvent { event } => self.record_user_event(event).await,
            other => Err(Error::UnsupportedCommand(other.kind().to_string())),
        }
    }

    pub async fn highlight(&self, backend_node_id: NodeId) -> Result<()> {
        {
            let state = self.state.lock().await;
            let known = state
                .current
                .as_ref()
                .is_some_and(|s| s.tree.find(backend_node_id).is_some());
            if !known {
                return Err(Error::UnknownNode(backend_node_id));
            }
        }
        self.source.highlight(backend_node_id).await
    }

    /// Starts a session from a fresh capture of the tree.
    pub async fn start_recording(&self) -> Result<RecordingStatus> {
        let mut state = self.state.lock().await;
        if state.recorder.is_recording() {
            return Err(Error::AlreadyRecording);
        }
        if let Err(err) = self.refresh_locked(&mut state).await {
            if state.current.is_none() {
                return Err(err);
            }
            tracing::warn!(error = %err, "refresh before recording failed, using last tree");
        }

        let snapshot = state.current.as_ref().ok_or(Error::EmptySnapshot)?;
        let (tree, url, title) = (
            snapshot.tree.clone(),
            snapshot.url.clone(),
            snapshot.title.clone(),
        );
        state.recorder.start(tree, url, title)?;

        let status = state.recorder.status();
        self.broadcast(SyncMessage::RecordingStatus(status.clone()));
        Ok(status)
    }

    /// Ends the session, broadcasts the recording, and writes it to the
    /// autosave directory when one is configured.
    pub async fn stop_recording(&self) -> Result<Recording> {
        let (recording, status) = {
            let mut state = self.state.lock().await;
            let recording = state.recorder.stop()?;
            (recording, state.recorder.status())
        };

        self.broadcast(SyncMessage::RecordingStopped {
            recording: Box::new(recording.clone()),
        });
        self.broadcast(SyncMessage::RecordingStatus(status));
        self.autosave(&recording).await;
        Ok(recording)
    }

    pub async fn record_user_event(&self, event: UserEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        state.recorder.record_user_event(event)?;
        self.broadcast(SyncMessage::RecordingStatus(state.recorder.status()));
        Ok(())
    }

    async fn autosave(&self, recording: &Recording) -> Option<PathBuf> {
        let dir = self.config.autosave_dir.clone()?;
        let path = dir.join(recording_file_name(recording.metadata.start_time));
        let target = path.clone();
        let recording = recording.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            recording.write_to_path(&target)
        })
        .await
        .map_err(|e| Error::Channel(format!("autosave task failed: {e}")))
        .and_then(|result| result);
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "recording saved");
                Some(path)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to save recording");
                None
            }
        }
    }

    /// Spawns the notification, poll and heartbeat loops. No-op when
    /// already running. Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let mut tasks = Vec::new();
        if let Some(rx) = self.source.take_notifications() {
            tasks.push(tokio::spawn(notification_loop(
                self.clone(),
                rx,
                token.clone(),
            )));
        }
        tasks.push(tokio::spawn(poll_loop(self.clone(), token.clone())));
        tasks.push(tokio::spawn(heartbeat_loop(self.clone(), token.clone())));
        tracing::info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "sync hub started"
        );
        *running = Some(Running { token, tasks });
    }

    /// Cancels the background loops and waits for them to exit.
    pub async fn stop(&self) {
        let Some(Running { token, tasks }) = self.running.lock().take() else {
            return;
        };
        token.cancel();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "sync hub task ended abnormally");
            }
        }
        tracing::info!("sync hub stopped");
    }
}

/// File name for an autosaved recording, stamped with its start time (UTC).
pub fn recording_file_name(start_time: u64) -> String {
    let stamp = i64::try_from(start_time)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y%m%d-%H%M%S-%3f").to_string())
        .unwrap_or_else(|| start_time.to_string());
    format!("recording-{stamp}.json")
}

async fn notification_loop(
    hub: Arc<SyncHub>,
    mut rx: mpsc::Receiver<CaptureNotification>,
    token: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            _ = token.cancelled() => break,
            notification = rx.recv() => notification,
        };
        let Some(notification) = notification else {
            tracing::debug!("capture notification channel closed");
            break;
        };
        match &notification {
            CaptureNotification::TreeRefreshed(tree) => {
                tracing::trace!(root = tree.backend_node_id, "tree refreshed");
            }
            CaptureNotification::NodesChanged(_) => tracing::trace!("nodes changed"),
        }
        if let Err(err) = hub.refresh().await {
            tracing::warn!(error = %err, "refresh after notification failed");
        }
    }
}

async fn poll_loop(hub: Arc<SyncHub>, token: CancellationToken) {
    let mut interval = tokio::time::interval(hub.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        if let Err(err) = hub.refresh().await {
            tracing::warn!(error = %err, "poll refresh failed");
        }
    }
}

async fn heartbeat_loop(hub: Arc<SyncHub>, token: CancellationToken) {
    let mut interval = tokio::time::interval(hub.config.heartbeat_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        let state = hub.state.lock().await;
        if state.recorder.is_recording() {
            hub.broadcast(SyncMessage::RecordingStatus(state.recorder.status()));
        }
    }
}
