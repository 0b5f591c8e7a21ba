use serde::{Deserialize, Serialize};

use crate::diff::Delta;
use crate::recorder::{Recording, RecordingStatus, UserEvent};
use crate::tree::{NodeId, TreeNode};

/// Envelope exchanged between the capture side and observers, tagged by
/// `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SyncMessage {
    /// Attach acknowledgement.
    Connected,
    /// Full current tree. `changed_node_ids` is set when the snapshot
    /// follows a change rather than an attach.
    Snapshot {
        tree: TreeNode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        changed_node_ids: Option<Vec<NodeId>>,
    },
    /// Incremental patch. Part of the vocabulary; the hub itself always
    /// broadcasts full snapshots.
    Delta { payload: Delta },
    Highlight { backend_node_id: NodeId },
    ClearHighlight,
    Refresh,
    StartRecording,
    StopRecording,
    /// Append an event-only timeline entry to the active recording.
    RecordUserEvent { event: UserEvent },
    RecordingStatus(RecordingStatus),
    RecordingStopped { recording: Box<Recording> },
    /// Sent to a single observer when its command failed.
    Error { message: String },
}

impl SyncMessage {
    /// Wire name of the variant, as found in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Connected => "connected",
            SyncMessage::Snapshot { .. } => "snapshot",
            SyncMessage::Delta { .. } => "delta",
            SyncMessage::Highlight { .. } => "highlight",
            SyncMessage::ClearHighlight => "clearHighlight",
            SyncMessage::Refresh => "refresh",
            SyncMessage::StartRecording => "startRecording",
            SyncMessage::StopRecording => "stopRecording",
            SyncMessage::RecordUserEvent { .. } => "recordUserEvent",
            SyncMessage::RecordingStatus(_) => "recordingStatus",
            SyncMessage::RecordingStopped { .. } => "recordingStopped",
            SyncMessage::Error { .. } => "error",
        }
    }

    /// Messages an observer may send to the capture side.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            SyncMessage::Highlight { .. }
                | SyncMessage::ClearHighlight
                | SyncMessage::Refresh
                | SyncMessage::StartRecording
                | SyncMessage::StopRecording
                | SyncMessage::RecordUserEvent { .. }
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        SyncMessage::Error {
            message: message.into(),
        }
    }
}
