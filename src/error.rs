//! Error taxonomy shared by the recorder, playback and sync layers.

use crate::diff::ApplyError;
use crate::tree::NodeId;

/// Errors surfaced by axscope operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `start` was called while a recording session is active.
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// A recording operation was called with no active session.
    #[error("no recording session is active")]
    NotRecording,

    /// The capture source yielded no nodes.
    #[error("capture source returned an empty snapshot")]
    EmptySnapshot,

    /// A tree failed structural validation.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// A recording file is malformed or missing required fields.
    #[error("invalid recording file: {0}")]
    InvalidRecordingFile(String),

    /// A timeline delta could not be applied to its target tree.
    #[error("delta at timeline index {index} could not be applied: {source}")]
    DeltaApplicationFailure {
        index: usize,
        #[source]
        source: ApplyError,
    },

    /// Playback index outside `-1..len`.
    #[error("timeline index {index} out of range (timeline has {len} entries)")]
    IndexOutOfRange { index: isize, len: usize },

    /// Playback speed must be finite and positive.
    #[error("invalid playback speed: {0}")]
    InvalidSpeed(f64),

    /// Highlight target does not exist in the current tree.
    #[error("node {0} is not present in the current tree")]
    UnknownNode(NodeId),

    /// The capture source failed.
    #[error("capture source error: {0}")]
    Capture(String),

    /// An observer sent a message that is not a command.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    /// Transport-level failure on the sync channel.
    #[error("channel error: {0}")]
    Channel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
