pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod playback;
pub mod recorder;
pub mod sync;
pub mod tree;
pub mod util;
pub mod web;

pub use capture::{CaptureNotification, CaptureSource, JsonFileCaptureSource, MockCaptureSource};
pub use config::Config;
pub use diff::{apply_delta, compute_delta, extract_changed_node_ids, Delta, PatchOp};
pub use error::{Error, Result};
pub use playback::{reconstruct_at, PlaybackController, PlaybackFrame, Player};
pub use recorder::{Recorder, Recording, RecordingStatus, TimelineEntry, UserEvent};
pub use sync::{spawn_observer, HubConfig, ObserverEvent, SyncHub, SyncMessage};
pub use tree::{build_tree, flatten_tree, validate_tree, Node, NodeId, Snapshot, TreeNode};
pub use web::{ServerConfig, SyncServer};
