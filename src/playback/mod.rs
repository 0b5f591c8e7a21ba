//! Deterministic reconstruction of recorded tree states.
//!
//! Tree state at timeline index `i` is the initial snapshot with deltas
//! `0..=i` applied in order; index `-1` is the initial snapshot itself. A
//! delta that fails to apply is logged and skipped, and reconstruction
//! continues with the next entry.

mod controller;

pub use controller::{PlaybackConfig, PlaybackController};

use std::sync::Arc;
use std::time::Duration;

use crate::diff::apply_delta;
use crate::error::{Error, Result};
use crate::recorder::{Recording, TimelineEntry, UserEvent};
use crate::tree::{NodeId, TreeNode};

/// Result of a reconstruction, with the indices whose delta was skipped.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub tree: TreeNode,
    pub skipped: Vec<usize>,
}

/// Tree state after applying `timeline[0..=index]`.
pub fn reconstruct_at(recording: &Recording, index: isize) -> Result<TreeNode> {
    reconstruct_with_report(recording, index).map(|r| r.tree)
}

pub fn reconstruct_with_report(recording: &Recording, index: isize) -> Result<Reconstruction> {
    check_index(recording, index)?;
    let mut tree = recording.initial_snapshot.tree.clone();
    let mut skipped = Vec::new();
    let upto = usize::try_from(index + 1).unwrap_or(0);
    for (i, entry) in recording.timeline.iter().enumerate().take(upto) {
        if let Err(err) = advance(&mut tree, i, entry) {
            tracing::warn!(error = %err, "skipping timeline entry");
            skipped.push(i);
        }
    }
    Ok(Reconstruction { tree, skipped })
}

fn check_index(recording: &Recording, index: isize) -> Result<()> {
    let len = recording.timeline.len();
    let in_range = index >= -1 && (index < 0 || (index as usize) < len);
    if in_range {
        Ok(())
    } else {
        Err(Error::IndexOutOfRange { index, len })
    }
}

fn advance(tree: &mut TreeNode, index: usize, entry: &TimelineEntry) -> Result<()> {
    if entry.delta.is_empty() {
        return Ok(());
    }
    *tree = apply_delta(tree, &entry.delta)
        .map_err(|source| Error::DeltaApplicationFailure { index, source })?;
    Ok(())
}

/// One emitted playback state.
#[derive(Debug, Clone)]
pub struct PlaybackFrame {
    pub index: isize,
    pub timestamp: u64,
    pub tree: Arc<TreeNode>,
    pub event: Option<UserEvent>,
    pub changed_node_ids: Option<Vec<NodeId>>,
}

/// Cursor over a recording that caches the tree at the current index.
///
/// Stepping forward by one applies a single delta; any other jump
/// reconstructs from the initial snapshot.
pub struct Player {
    recording: Arc<Recording>,
    index: isize,
    tree: Arc<TreeNode>,
    skipped: Vec<usize>,
}

impl Player {
    pub fn new(recording: Arc<Recording>) -> Self {
        let tree = Arc::new(recording.initial_snapshot.tree.clone());
        Self {
            recording,
            index: -1,
            tree,
            skipped: Vec::new(),
        }
    }

    pub fn recording(&self) -> &Arc<Recording> {
        &self.recording
    }

    pub fn index(&self) -> isize {
        self.index
    }

    pub fn tree(&self) -> Arc<TreeNode> {
        self.tree.clone()
    }

    pub fn len(&self) -> usize {
        self.recording.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.timeline.is_empty()
    }

    pub fn is_at_end(&self) -> bool {
        self.index + 1 >= self.len() as isize
    }

    /// Timeline indices whose delta failed to apply on the way to the
    /// current frame.
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    pub fn entry(&self, index: isize) -> Option<&TimelineEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.recording.timeline.get(i))
    }

    pub fn seek(&mut self, index: isize) -> Result<()> {
        check_index(&self.recording, index)?;
        if index == self.index {
            return Ok(());
        }

        if index == self.index + 1 {
            let i = index as usize;
            let mut tree = (*self.tree).clone();
            match advance(&mut tree, i, &self.recording.timeline[i]) {
                Ok(()) => self.tree = Arc::new(tree),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping timeline entry");
                    self.skipped.push(i);
                }
            }
        } else {
            let report = reconstruct_with_report(&self.recording, index)?;
            self.tree = Arc::new(report.tree);
            self.skipped = report.skipped;
        }
        self.index = index;
        Ok(())
    }

    pub fn frame(&self) -> PlaybackFrame {
        let entry = self.entry(self.index);
        PlaybackFrame {
            index: self.index,
            timestamp: entry
                .map(|e| e.timestamp)
                .unwrap_or(self.recording.initial_snapshot.timestamp),
            tree: self.tree.clone(),
            event: entry.and_then(|e| e.event.clone()),
            changed_node_ids: entry.and_then(|e| e.changed_node_ids.clone()),
        }
    }

    /// Wait before advancing to the next entry:
    /// `max(min_step_delay, gap / speed)`, saturating at `Duration::MAX` for
    /// speeds small enough to overflow. `None` at the last entry.
    pub fn next_delay(&self, min_step_delay: Duration, speed: f64) -> Option<Duration> {
        let next = self.entry(self.index + 1)?;
        let current = self
            .entry(self.index)
            .map(|e| e.timestamp)
            .unwrap_or(self.recording.initial_snapshot.timestamp);
        let gap_ms = next.timestamp.saturating_sub(current) as f64;
        let scaled =
            Duration::try_from_secs_f64(gap_ms / 1000.0 / speed).unwrap_or(Duration::MAX);
        Some(scaled.max(min_step_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{compute_delta, Delta, PatchOp};
    use crate::recorder::{RecordingMetadata, RECORDING_FORMAT_VERSION};
    use crate::tree::Snapshot;

    pub(crate) fn page(name: &str) -> TreeNode {
        TreeNode::new(1, "document")
            .with_children(vec![TreeNode::new(2, "button").with_name(name)])
    }

    pub(crate) fn recording_with(timestamps_and_names: &[(u64, &str)]) -> Recording {
        let mut prev = page("0");
        let mut timeline = Vec::new();
        for (ts, name) in timestamps_and_names {
            let next = page(name);
            timeline.push(TimelineEntry {
                timestamp: *ts,
                event: None,
                delta: compute_delta(&prev, &next),
                changed_node_ids: Some(vec![2]),
            });
            prev = next;
        }
        Recording {
            metadata: RecordingMetadata {
                start_time: 1_000,
                end_time: 5_000,
                url: None,
                title: None,
                version: RECORDING_FORMAT_VERSION.to_string(),
            },
            initial_snapshot: Snapshot::at(1_000, page("0"), None, None),
            timeline,
        }
    }

    #[test]
    fn minus_one_is_initial_snapshot() {
        let recording = recording_with(&[(1_100, "a"), (1_200, "b")]);
        assert_eq!(
            reconstruct_at(&recording, -1).unwrap(),
            recording.initial_snapshot.tree
        );
    }

    #[test]
    fn last_index_applies_every_delta() {
        let recording = recording_with(&[(1_100, "a"), (1_200, "b"), (1_300, "c")]);
        let mut sequential = recording.initial_snapshot.tree.clone();
        for entry in &recording.timeline {
            sequential = apply_delta(&sequential, &entry.delta).unwrap();
        }
        assert_eq!(reconstruct_at(&recording, 2).unwrap(), sequential);
        assert_eq!(sequential, page("c"));
    }

    #[test]
    fn out_of_range_index_fails() {
        let recording = recording_with(&[(1_100, "a")]);
        assert!(matches!(
            reconstruct_at(&recording, 1),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(matches!(
            reconstruct_at(&recording, -2),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn broken_delta_is_skipped_not_fatal() {
        let mut recording = recording_with(&[(1_100, "a"), (1_200, "b"), (1_300, "c")]);
        recording.timeline[1].delta = Delta::from_ops(vec![PatchOp::RemoveNode { id: 77 }]);

        let report = reconstruct_with_report(&recording, 2).unwrap();
        assert_eq!(report.skipped, vec![1]);
        assert_eq!(report.tree, page("c"));
    }

    #[test]
    fn player_matches_reconstruction_in_any_order() {
        let recording = Arc::new(recording_with(&[(1_100, "a"), (1_200, "b"), (1_300, "c")]));
        let mut player = Player::new(recording.clone());
        for index in [0, 1, 2, 0, -1, 2, 1] {
            player.seek(index).unwrap();
            assert_eq!(*player.tree(), reconstruct_at(&recording, index).unwrap());
        }
    }

    #[test]
    fn frame_carries_entry_metadata() {
        let recording = Arc::new(recording_with(&[(1_100, "a")]));
        let mut player = Player::new(recording);
        assert_eq!(player.frame().timestamp, 1_000);
        player.seek(0).unwrap();
        let frame = player.frame();
        assert_eq!(frame.index, 0);
        assert_eq!(frame.timestamp, 1_100);
        assert_eq!(frame.changed_node_ids, Some(vec![2]));
        assert!(player.is_at_end());
    }

    #[test]
    fn delay_respects_speed_and_floor() {
        let recording = Arc::new(recording_with(&[(2_000, "a"), (2_010, "b")]));
        let mut player = Player::new(recording);
        let floor = Duration::from_millis(50);

        assert_eq!(player.next_delay(floor, 2.0), Some(Duration::from_millis(500)));
        player.seek(0).unwrap();
        assert_eq!(player.next_delay(floor, 1.0), Some(floor));
        player.seek(1).unwrap();
        assert_eq!(player.next_delay(floor, 1.0), None);
    }

    #[test]
    fn tiny_speed_saturates_delay() {
        let recording = Arc::new(recording_with(&[(2_000, "a")]));
        let player = Player::new(recording);
        assert_eq!(
            player.next_delay(Duration::from_millis(50), 1e-300),
            Some(Duration::MAX)
        );
    }
}
