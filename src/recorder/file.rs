use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use super::{Recording, RECORDING_FORMAT_VERSION};
use crate::error::{Error, Result};
use crate::tree::{flatten_tree, validate_tree};

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidRecordingFile(message.into())
}

impl Recording {
    /// Parses and validates a recording file body.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        check_shape(&value)?;
        let recording: Recording =
            serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        recording.validate()?;
        Ok(recording)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let major = self.metadata.version.split('.').next().unwrap_or_default();
        let supported = RECORDING_FORMAT_VERSION.split('.').next().unwrap_or_default();
        if major != supported {
            return Err(invalid(format!(
                "unsupported recording version {:?} (expected {}.x)",
                self.metadata.version, supported
            )));
        }
        if self.metadata.end_time < self.metadata.start_time {
            return Err(invalid("metadata.endTime precedes metadata.startTime"));
        }
        if !validate_tree(&self.initial_snapshot.tree) {
            return Err(invalid("initialSnapshot.tree failed structural validation"));
        }
        let derived = flatten_tree(&self.initial_snapshot.tree);
        let flat = &self.initial_snapshot.flat_nodes;
        if flat.len() != derived.len() {
            return Err(invalid(format!(
                "initialSnapshot.flatNodes has {} nodes but the tree has {}",
                flat.len(),
                derived.len()
            )));
        }
        if let Some(index) = flat.iter().zip(&derived).position(|(a, b)| a != b) {
            return Err(invalid(format!(
                "initialSnapshot.flatNodes[{index}] (node {}) does not match the tree",
                flat[index].backend_node_id
            )));
        }
        for (index, pair) in self.timeline.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(invalid(format!(
                    "timeline[{}].timestamp goes backwards ({} < {})",
                    index + 1,
                    pair[1].timestamp,
                    pair[0].timestamp
                )));
            }
        }
        Ok(())
    }

    pub fn read_from_path(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let value: Value = serde_json::from_reader(reader)
            .map_err(|e| invalid(format!("{}: not valid JSON: {e}", path.display())))?;
        Self::from_json_value(value)
    }

    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Required-field walk over the raw JSON so that errors name the offending
/// path instead of a serde position.
fn check_shape(value: &Value) -> Result<()> {
    let root = value
        .as_object()
        .ok_or_else(|| invalid("top level is not an object"))?;

    let metadata = root
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("missing metadata object"))?;
    for key in ["startTime", "endTime"] {
        if !metadata.get(key).is_some_and(Value::is_u64) {
            return Err(invalid(format!("metadata.{key} is missing or not a number")));
        }
    }
    if !metadata.get("version").is_some_and(Value::is_string) {
        return Err(invalid("metadata.version is missing or not a string"));
    }

    let snapshot = root
        .get("initialSnapshot")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("missing initialSnapshot object"))?;
    if !snapshot.get("timestamp").is_some_and(Value::is_u64) {
        return Err(invalid("initialSnapshot.timestamp is missing or not a number"));
    }
    if !snapshot.get("tree").is_some_and(Value::is_object) {
        return Err(invalid("initialSnapshot.tree is missing or not an object"));
    }
    if !snapshot.get("flatNodes").is_some_and(Value::is_array) {
        return Err(invalid("initialSnapshot.flatNodes is missing or not an array"));
    }

    let timeline = root
        .get("timeline")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing timeline array"))?;
    for (index, entry) in timeline.iter().enumerate() {
        if !entry.get("timestamp").is_some_and(Value::is_u64) {
            return Err(invalid(format!(
                "timeline[{index}].timestamp is missing or not a number"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{Recorder, UserEvent};
    use crate::tree::TreeNode;
    use tempfile::tempdir;

    fn sample_recording() -> Recording {
        let page = |name: &str| {
            TreeNode::new(1, "document")
                .with_children(vec![TreeNode::new(2, "button").with_name(name)])
        };
        let mut recorder = Recorder::default();
        recorder
            .start(page("a"), Some("https://example.test".into()), None)
            .unwrap();
        recorder
            .record_user_event(UserEvent::new("click", serde_json::json!({"target": 2})))
            .unwrap();
        recorder.record_tree_change(page("b"), None).unwrap();
        recorder.stop().unwrap()
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recording.json");

        let recording = sample_recording();
        recording.write_to_path(&path).unwrap();
        let read = Recording::read_from_path(&path).unwrap();

        assert_eq!(read, recording);
    }

    #[test]
    fn missing_metadata_is_rejected_with_path() {
        let err = Recording::from_json_str(r#"{"initialSnapshot": {}, "timeline": []}"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing metadata"), "{err}");
    }

    #[test]
    fn bad_timeline_timestamp_names_entry() {
        let mut value = serde_json::to_value(sample_recording()).unwrap();
        value["timeline"][1]["timestamp"] = serde_json::json!("soon");
        let err = Recording::from_json_value(value).unwrap_err();
        assert!(err.to_string().contains("timeline[1].timestamp"), "{err}");
    }

    #[test]
    fn backwards_timestamps_are_rejected() {
        let mut recording = sample_recording();
        recording.timeline[1].timestamp = 0;
        let value = serde_json::to_value(&recording).unwrap();
        let err = Recording::from_json_value(value).unwrap_err();
        assert!(matches!(err, Error::InvalidRecordingFile(_)));
    }

    #[test]
    fn unsupported_major_version_is_rejected() {
        let mut value = serde_json::to_value(sample_recording()).unwrap();
        value["metadata"]["version"] = serde_json::json!("2.0");
        let err = Recording::from_json_value(value).unwrap_err();
        assert!(err.to_string().contains("unsupported recording version"), "{err}");
    }

    #[test]
    fn flat_table_must_match_tree() {
        let mut value = serde_json::to_value(sample_recording()).unwrap();
        value["initialSnapshot"]["flatNodes"][1]["parentId"] = serde_json::json!(42);
        let err = Recording::from_json_value(value).unwrap_err();
        assert!(err.to_string().contains("flatNodes[1]"), "{err}");

        let mut value = serde_json::to_value(sample_recording()).unwrap();
        value["initialSnapshot"]["flatNodes"][0]["backendNodeId"] = serde_json::json!(9);
        assert!(matches!(
            Recording::from_json_value(value),
            Err(Error::InvalidRecordingFile(_))
        ));
    }

    #[test]
    fn null_delta_is_accepted() {
        let mut value = serde_json::to_value(sample_recording()).unwrap();
        value["timeline"][0]["delta"] = Value::Null;
        let recording = Recording::from_json_value(value).unwrap();
        assert!(recording.timeline[0].delta.is_empty());
    }

    #[test]
    fn garbage_is_invalid_recording() {
        let err = Recording::from_json_str("not json").unwrap_err();
        assert!(matches!(err, Error::InvalidRecordingFile(_)));
    }
}
