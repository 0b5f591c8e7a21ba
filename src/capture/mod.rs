//! Capture-side collaborator seam.
//!
//! A [`CaptureSource`] hands out full snapshots on demand and, optionally, a
//! channel of change notifications. Notifications carry no authoritative
//! state: the hub treats every one of them as a trigger to re-fetch.

mod file;
mod mock;

pub use file::JsonFileCaptureSource;
pub use mock::MockCaptureSource;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::tree::{NodeId, Snapshot, TreeNode};

/// Change notification pushed by a capture source.
#[derive(Debug, Clone)]
pub enum CaptureNotification {
    /// The whole tree was rebuilt on the capture side.
    TreeRefreshed(TreeNode),
    /// Some nodes changed. The payload is whatever the transport sent.
    NodesChanged(serde_json::Value),
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Fetch the current tree. `Ok(None)` when the page has no tree yet.
    async fn get_full_tree(&self) -> Result<Option<Snapshot>>;

    /// Hand over the notification receiver. Returns `None` once taken, or
    /// when the source only supports polling.
    fn take_notifications(&self) -> Option<mpsc::Receiver<CaptureNotification>>;

    /// Visually highlight a node on the inspected page.
    async fn highlight(&self, backend_node_id: NodeId) -> Result<()>;

    async fn clear_highlight(&self) -> Result<()>;
}
