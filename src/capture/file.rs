use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{CaptureNotification, CaptureSource};
use crate::error::{Error, Result};
use crate::tree::{Node, NodeId, Snapshot};

/// Accepted file bodies: a bare node table, or the table with page metadata.
#[derive(Deserialize)]
#[serde(untagged)]
enum CaptureFile {
    Nodes(Vec<Node>),
    Page {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
        nodes: Vec<Node>,
    },
}

/// Capture source that re-reads a flat node table from disk on every fetch.
///
/// Editing the file while `serve` runs is picked up by the next poll.
pub struct JsonFileCaptureSource {
    path: PathBuf,
    highlighted: Mutex<Option<NodeId>>,
}

impl JsonFileCaptureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            highlighted: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn highlighted(&self) -> Option<NodeId> {
        *self.highlighted.lock()
    }
}

#[async_trait]
impl CaptureSource for JsonFileCaptureSource {
    async fn get_full_tree(&self) -> Result<Option<Snapshot>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Capture(format!("{}: {e}", self.path.display())))?;
        let parsed: CaptureFile = serde_json::from_str(&contents)
            .map_err(|e| Error::Capture(format!("{}: {e}", self.path.display())))?;

        let (nodes, url, title) = match parsed {
            CaptureFile::Nodes(nodes) => (nodes, None, None),
            CaptureFile::Page { url, title, nodes } => (nodes, url, title),
        };
        if nodes.is_empty() {
            tracing::debug!(path = %self.path.display(), "capture file has no nodes");
            return Ok(None);
        }
        Snapshot::from_flat_nodes(&nodes, url, title).map(Some)
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<CaptureNotification>> {
        None
    }

    async fn highlight(&self, backend_node_id: NodeId) -> Result<()> {
        tracing::info!(backend_node_id, "highlight");
        *self.highlighted.lock() = Some(backend_node_id);
        Ok(())
    }

    async fn clear_highlight(&self) -> Result<()> {
        *self.highlighted.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn reads_bare_node_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        fs::write(
            &path,
            r#"[
                {"backendNodeId": 1, "role": "document", "childIds": [2]},
                {"backendNodeId": 2, "role": "button", "name": "OK", "parentId": 1}
            ]"#,
        )
        .unwrap();

        let source = JsonFileCaptureSource::new(&path);
        let snapshot = source.get_full_tree().await.unwrap().unwrap();
        assert_eq!(snapshot.tree.backend_node_id, 1);
        assert_eq!(snapshot.tree.children[0].name.as_deref(), Some("OK"));
        assert!(snapshot.url.is_none());
    }

    #[tokio::test]
    async fn reads_page_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        fs::write(
            &path,
            r#"{"url": "https://example.test", "title": "Example",
                "nodes": [{"backendNodeId": 5, "role": "document"}]}"#,
        )
        .unwrap();

        let snapshot = JsonFileCaptureSource::new(&path)
            .get_full_tree()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.url.as_deref(), Some("https://example.test"));
        assert_eq!(snapshot.title.as_deref(), Some("Example"));
        assert_eq!(snapshot.flat_nodes.len(), 1);
    }

    #[tokio::test]
    async fn empty_table_is_no_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, "[]").unwrap();
        assert!(JsonFileCaptureSource::new(&path)
            .get_full_tree()
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_file_is_capture_error() {
        let source = JsonFileCaptureSource::new("/nonexistent/axscope.json");
        assert!(matches!(
            source.get_full_tree().await,
            Err(Error::Capture(_))
        ));
    }

    #[tokio::test]
    async fn highlight_is_tracked() {
        let source = JsonFileCaptureSource::new("unused.json");
        source.highlight(4).await.unwrap();
        assert_eq!(source.highlighted(), Some(4));
        source.clear_highlight().await.unwrap();
        assert_eq!(source.highlighted(), None);
    }
}
