//! Integration tests for the record -> save -> load -> replay flow
//!
//! Drives the recorder with a sequence of page states, persists the
//! recording, and checks that playback reproduces every recorded state.

use std::sync::Arc;

use super::common::fixtures::{flat_node, login_error_page, login_page, write_capture_file};
use axscope::playback::{reconstruct_with_report, PlaybackConfig};
use axscope::recorder::RecorderConfig;
use axscope::{
    reconstruct_at, HubConfig, JsonFileCaptureSource, PlaybackController, Player, Recorder,
    Recording, SyncHub, TreeNode, UserEvent,
};
use tempfile::TempDir;

fn page_states() -> Vec<TreeNode> {
    let mut typed = login_page("Sign in");
    typed.children[1].children[0].value = Some("me@example.test".into());
    let mut reordered = typed.clone();
    reordered.children[1].children.reverse();
    vec![
        typed,
        reordered,
        login_error_page(),
        TreeNode::new(40, "document").with_name("Redirected"),
    ]
}

fn record(states: &[TreeNode], config: RecorderConfig) -> Recording {
    let mut recorder = Recorder::new(config);
    recorder
        .start(login_page("Sign in"), Some("https://example.test/login".into()), None)
        .unwrap();
    for (i, state) in states.iter().enumerate() {
        if i == 1 {
            recorder
                .record_user_event(UserEvent::new("keydown", serde_json::json!({"key": "Tab"})))
                .unwrap();
        }
        recorder.record_tree_change(state.clone(), None).unwrap();
    }
    recorder.stop().unwrap()
}

/// Test that every timeline index reconstructs the state recorded there
#[test]
fn test_replay_reproduces_every_recorded_state() {
    let states = page_states();
    let recording = record(&states, RecorderConfig::default());

    // one event-only entry plus one entry per state
    assert_eq!(recording.timeline.len(), states.len() + 1);

    assert_eq!(reconstruct_at(&recording, -1).unwrap(), login_page("Sign in"));
    assert_eq!(reconstruct_at(&recording, 0).unwrap(), states[0]);
    // the event-only entry leaves the tree alone
    assert_eq!(reconstruct_at(&recording, 1).unwrap(), states[0]);
    for (i, state) in states.iter().enumerate().skip(1) {
        assert_eq!(reconstruct_at(&recording, i as isize + 1).unwrap(), *state);
    }
}

/// Test that a recording survives a trip through the file format
#[test]
fn test_saved_recording_replays_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let recording = record(&page_states(), RecorderConfig::default());
    recording.write_to_path(&path).unwrap();

    let loaded = Recording::read_from_path(&path).unwrap();
    assert_eq!(loaded.metadata.url.as_deref(), Some("https://example.test/login"));

    let last = loaded.timeline.len() as isize - 1;
    let report = reconstruct_with_report(&loaded, last).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.tree, TreeNode::new(40, "document").with_name("Redirected"));

    let mut player = Player::new(Arc::new(loaded));
    for index in [last, 0, 2, -1, 3] {
        player.seek(index).unwrap();
        assert_eq!(*player.tree(), reconstruct_at(&recording, index).unwrap());
    }
}

/// Test that a capped timeline still replays exactly after eviction
#[test]
fn test_evicted_timeline_stays_reconstructible() {
    let states = page_states();
    let recording = record(
        &states,
        RecorderConfig {
            max_timeline_entries: 2,
            rebaseline_on_evict: true,
        },
    );
    assert_eq!(recording.timeline.len(), 2);
    assert_eq!(recording.initial_snapshot.tree, states[1]);
    assert_eq!(reconstruct_at(&recording, 1).unwrap(), states[3]);
}

/// Test that auto-play walks the whole loaded recording in order
#[tokio::test(start_paused = true)]
async fn test_autoplay_over_loaded_recording() {
    let recording = Arc::new(record(&page_states(), RecorderConfig::default()));
    let len = recording.timeline.len();
    let controller = PlaybackController::new(recording.clone(), PlaybackConfig::default()).unwrap();
    let mut frames = controller.subscribe();

    assert!(controller.play());
    let mut last = None;
    for expected in 0..len as isize {
        let frame = frames.recv().await.unwrap();
        assert_eq!(frame.index, expected);
        last = Some(frame);
    }
    let last = last.unwrap();
    assert_eq!(*last.tree, reconstruct_at(&recording, len as isize - 1).unwrap());
    assert!(!controller.is_playing());
}

/// Test recording through the hub with a file-backed capture source
#[tokio::test]
async fn test_file_capture_session_autosaves() {
    let dir = TempDir::new().unwrap();
    let capture_path = dir.path().join("page.json");
    let nodes = vec![
        flat_node(1, "document", None, None, &[2]),
        flat_node(2, "button", Some("Save"), Some(1), &[]),
    ];
    write_capture_file(&capture_path, "https://example.test/editor", &nodes);

    let hub = SyncHub::new(
        Arc::new(JsonFileCaptureSource::new(&capture_path)),
        HubConfig {
            autosave_dir: Some(dir.path().join("recordings")),
            ..HubConfig::default()
        },
    );
    hub.start_recording().await.unwrap();

    let nodes = vec![
        flat_node(1, "document", None, None, &[2, 3]),
        flat_node(2, "button", Some("Saved"), Some(1), &[]),
        flat_node(3, "status", Some("All changes saved"), Some(1), &[]),
    ];
    write_capture_file(&capture_path, "https://example.test/editor", &nodes);
    hub.refresh().await.unwrap();

    let recording = hub.stop_recording().await.unwrap();
    assert_eq!(recording.metadata.url.as_deref(), Some("https://example.test/editor"));
    assert_eq!(recording.timeline.len(), 1);
    let mut changed = recording.timeline[0].changed_node_ids.clone().unwrap();
    changed.sort();
    assert_eq!(changed, vec![2, 3]);

    let saved: Vec<_> = std::fs::read_dir(dir.path().join("recordings"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(saved.len(), 1);
    let loaded = Recording::read_from_path(&saved[0].path()).unwrap();
    assert_eq!(reconstruct_at(&loaded, 0).unwrap().node_count(), 3);
}
