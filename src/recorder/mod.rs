//! Recording session state machine.
//!
//! A [`Recorder`] is either idle or owns exactly one session: an initial
//! snapshot, the tree baseline the next change is diffed against, and a
//! bounded timeline of entries. `stop` hands back a finished [`Recording`]
//! and resets to idle.

mod file;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::diff::{apply_delta, compute_delta, extract_changed_node_ids, Delta};
use crate::error::{Error, Result};
use crate::tree::{validate_tree, NodeId, Snapshot, TreeNode};
use crate::util::now_ms;

pub const RECORDING_FORMAT_VERSION: &str = "1.0";
pub const DEFAULT_MAX_TIMELINE_ENTRIES: usize = 10_000;

/// A user interaction correlated with a timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: u64,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl UserEvent {
    pub fn new(kind: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp: now_ms(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<UserEvent>,
    #[serde(default, deserialize_with = "Delta::deserialize_or_empty")]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_node_ids: Option<Vec<NodeId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub start_time: u64,
    pub end_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub version: String,
}

/// A finished session: initial snapshot plus ordered timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub metadata: RecordingMetadata,
    pub initial_snapshot: Snapshot,
    pub timeline: Vec<TimelineEntry>,
}

/// Read-only view of the recorder, also the payload of the
/// `recordingStatus` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub timeline_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    /// Milliseconds since `start_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl RecordingStatus {
    pub fn idle() -> Self {
        Self {
            is_recording: false,
            timeline_length: 0,
            start_time: None,
            duration: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Timeline cap; the oldest entry is evicted past it.
    pub max_timeline_entries: usize,
    /// Fold evicted deltas into the initial snapshot so that the remaining
    /// timeline still reconstructs exactly.
    pub rebaseline_on_evict: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_timeline_entries: DEFAULT_MAX_TIMELINE_ENTRIES,
            rebaseline_on_evict: true,
        }
    }
}

struct RecordingSession {
    start_time: u64,
    initial_snapshot: Snapshot,
    baseline: TreeNode,
    timeline: VecDeque<TimelineEntry>,
    evicted: u64,
}

pub struct Recorder {
    config: RecorderConfig,
    session: Option<RecordingSession>,
    clock: fn() -> u64,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            session: None,
            clock: now_ms,
        }
    }

    /// Replace the millisecond clock (tests).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Idle -> Recording.
    pub fn start(
        &mut self,
        initial_tree: TreeNode,
        url: Option<String>,
        title: Option<String>,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyRecording);
        }
        if !validate_tree(&initial_tree) {
            return Err(Error::InvalidTree(format!(
                "initial tree rooted at {} failed validation",
                initial_tree.backend_node_id
            )));
        }

        let start_time = (self.clock)();
        let initial_snapshot = Snapshot::at(start_time, initial_tree.clone(), url, title);
        tracing::info!(
            start_time,
            nodes = initial_snapshot.flat_nodes.len(),
            url = initial_snapshot.url.as_deref().unwrap_or(""),
            "recording started"
        );
        self.session = Some(RecordingSession {
            start_time,
            initial_snapshot,
            baseline: initial_tree,
            timeline: VecDeque::new(),
            evicted: 0,
        });
        Ok(())
    }

    /// Diffs `new_tree` against the baseline and appends an entry when the
    /// delta is non-empty. Returns the appended entry, or `None` when the
    /// tree did not change.
    pub fn record_tree_change(
        &mut self,
        new_tree: TreeNode,
        event: Option<UserEvent>,
    ) -> Result<Option<&TimelineEntry>> {
        let now = (self.clock)();
        let config = self.config.clone();
        let session = self.session.as_mut().ok_or(Error::NotRecording)?;
        if !validate_tree(&new_tree) {
            return Err(Error::InvalidTree(format!(
                "tree rooted at {} failed validation",
                new_tree.backend_node_id
            )));
        }

        let delta = compute_delta(&session.baseline, &new_tree);
        if delta.is_empty() {
            tracing::trace!("tree unchanged, nothing recorded");
            return Ok(None);
        }

        let changed: Vec<NodeId> = extract_changed_node_ids(&session.baseline, &new_tree)
            .into_iter()
            .collect();
        tracing::debug!(
            ops = delta.len(),
            changed = changed.len(),
            "recording tree change"
        );
        let entry = TimelineEntry {
            timestamp: session.next_timestamp(now),
            event,
            delta,
            changed_node_ids: Some(changed),
        };
        session.baseline = new_tree;
        session.push(entry, &config);
        Ok(session.timeline.back())
    }

    /// Appends an event-only entry with an empty delta.
    pub fn record_user_event(&mut self, event: UserEvent) -> Result<&TimelineEntry> {
        let now = (self.clock)();
        let config = self.config.clone();
        let session = self.session.as_mut().ok_or(Error::NotRecording)?;
        let entry = TimelineEntry {
            timestamp: session.next_timestamp(now),
            event: Some(event),
            delta: Delta::empty(),
            changed_node_ids: None,
        };
        session.push(entry, &config);
        session.timeline.back().ok_or(Error::NotRecording)
    }

    /// Recording -> Idle, returning the finished recording.
    pub fn stop(&mut self) -> Result<Recording> {
        let session = self.session.take().ok_or(Error::NotRecording)?;
        let end_time = (self.clock)().max(session.start_time);
        tracing::info!(
            entries = session.timeline.len(),
            evicted = session.evicted,
            duration_ms = end_time - session.start_time,
            "recording stopped"
        );

        let metadata = RecordingMetadata {
            start_time: session.start_time,
            end_time,
            url: session.initial_snapshot.url.clone(),
            title: session.initial_snapshot.title.clone(),
            version: RECORDING_FORMAT_VERSION.to_string(),
        };
        Ok(Recording {
            metadata,
            initial_snapshot: session.initial_snapshot,
            timeline: session.timeline.into(),
        })
    }

    pub fn status(&self) -> RecordingStatus {
        match &self.session {
            None => RecordingStatus::idle(),
            Some(session) => RecordingStatus {
                is_recording: true,
                timeline_length: session.timeline.len(),
                start_time: Some(session.start_time),
                duration: Some((self.clock)().saturating_sub(session.start_time)),
            },
        }
    }

    /// Current baseline tree, if recording.
    pub fn baseline(&self) -> Option<&TreeNode> {
        self.session.as_ref().map(|s| &s.baseline)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl RecordingSession {
    /// Keeps timestamps non-decreasing even if the wall clock steps back.
    fn next_timestamp(&self, now: u64) -> u64 {
        let floor = self
            .timeline
            .back()
            .map(|e| e.timestamp)
            .unwrap_or(self.start_time);
        now.max(floor)
    }

    fn push(&mut self, entry: TimelineEntry, config: &RecorderConfig) {
        self.timeline.push_back(entry);
        let cap = config.max_timeline_entries.max(1);
        while self.timeline.len() > cap {
            let Some(evicted) = self.timeline.pop_front() else {
                break;
            };
            self.evicted += 1;
            if config.rebaseline_on_evict {
                self.rebaseline(evicted);
            }
        }
    }

    fn rebaseline(&mut self, evicted: TimelineEntry) {
        if evicted.delta.is_empty() {
            self.initial_snapshot.timestamp = evicted.timestamp;
            return;
        }
        match apply_delta(&self.initial_snapshot.tree, &evicted.delta) {
            Ok(tree) => {
                self.initial_snapshot.set_tree(tree);
                self.initial_snapshot.timestamp = evicted.timestamp;
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "failed to fold evicted entry into initial snapshot"
                );
            }
        }
    }
}
