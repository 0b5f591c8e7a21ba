use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{CaptureNotification, CaptureSource};
use crate::error::{Error, Result};
use crate::tree::{NodeId, Snapshot, TreeNode};

const NOTIFICATION_CAPACITY: usize = 32;

/// In-memory capture source for tests and demos.
///
/// The served tree is whatever was last passed to [`set_tree`]; pushing a
/// notification only wakes the hub, which then fetches that tree.
///
/// [`set_tree`]: MockCaptureSource::set_tree
pub struct MockCaptureSource {
    tree: Mutex<Option<TreeNode>>,
    url: Option<String>,
    fail_next: Mutex<Option<String>>,
    notify_tx: mpsc::Sender<CaptureNotification>,
    notify_rx: Mutex<Option<mpsc::Receiver<CaptureNotification>>>,
    highlights: Mutex<Vec<Option<NodeId>>>,
    fetches: AtomicUsize,
}

impl MockCaptureSource {
    pub fn new(tree: Option<TreeNode>) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        Self {
            tree: Mutex::new(tree),
            url: None,
            fail_next: Mutex::new(None),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            highlights: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn set_tree(&self, tree: TreeNode) {
        *self.tree.lock() = Some(tree);
    }

    pub fn clear(&self) {
        *self.tree.lock() = None;
    }

    /// Make the next fetch fail with a capture error.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// Swap the tree and announce it on the notification channel.
    pub async fn push_tree(&self, tree: TreeNode) {
        self.set_tree(tree.clone());
        self.push_notification(CaptureNotification::TreeRefreshed(tree))
            .await;
    }

    pub async fn push_notification(&self, notification: CaptureNotification) {
        if self.notify_tx.send(notification).await.is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }

    /// Every highlight call so far; `None` records a clear.
    pub fn highlights(&self) -> Vec<Option<NodeId>> {
        self.highlights.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for MockCaptureSource {
    async fn get_full_tree(&self) -> Result<Option<Snapshot>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_next.lock().take() {
            return Err(Error::Capture(message));
        }
        let tree = self.tree.lock().clone();
        Ok(tree.map(|tree| Snapshot::new(tree, self.url.clone(), None)))
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<CaptureNotification>> {
        self.notify_rx.lock().take()
    }

    async fn highlight(&self, backend_node_id: NodeId) -> Result<()> {
        self.highlights.lock().push(Some(backend_node_id));
        Ok(())
    }

    async fn clear_highlight(&self) -> Result<()> {
        self.highlights.lock().push(None);
        Ok(())
    }
}
