//! Identity-keyed structural diff and patch for accessibility trees.
//!
//! A [`Delta`] is an ordered list of [`PatchOp`]s addressed by
//! `backendNodeId`, never by position alone, so that inserts, removals and
//! moves stay distinguishable from content edits. The contract is
//! `apply_delta(a, &compute_delta(a, b)) == b`.

mod apply;
mod compute;

pub use apply::apply_delta;
pub use compute::{canonical_json, canonically_equal, compute_delta, extract_changed_node_ids};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::tree::{BoundingBox, NodeId, TreeNode};

pub const DELTA_FORMAT_VERSION: u32 = 1;

/// Versioned patch between two tree states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub version: u32,
    #[serde(default)]
    pub ops: Vec<PatchOp>,
}

impl Delta {
    pub fn empty() -> Self {
        Self {
            version: DELTA_FORMAT_VERSION,
            ops: Vec::new(),
        }
    }

    pub fn from_ops(ops: Vec<PatchOp>) -> Self {
        Self {
            version: DELTA_FORMAT_VERSION,
            ops,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Serde helper reading `null` as the empty delta.
    pub fn deserialize_or_empty<'de, D>(deserializer: D) -> Result<Delta, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Delta>::deserialize(deserializer)?.unwrap_or_default())
    }
}

impl Default for Delta {
    fn default() -> Self {
        Self::empty()
    }
}

/// One patch step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PatchOp {
    /// Swap in an entirely new tree (root identity changed).
    ReplaceRoot { tree: TreeNode },
    /// Delete a node. Surviving children are detached until a later
    /// `moveNode` places them.
    RemoveNode { id: NodeId },
    /// Insert `node` (with any children it carries) under `parent_id`.
    AddNode {
        parent_id: NodeId,
        index: usize,
        node: TreeNode,
    },
    /// Re-parent or reorder an existing node. `index` is the final position
    /// within the new parent.
    MoveNode {
        id: NodeId,
        parent_id: NodeId,
        index: usize,
    },
    /// Overwrite one content field.
    SetField { id: NodeId, change: FieldChange },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldChange {
    Role(String),
    Name(Option<String>),
    Value(Option<String>),
    Properties(BTreeMap<String, serde_json::Value>),
    BoundingBox(Option<BoundingBox>),
    Attributes(BTreeMap<String, String>),
    States(BTreeSet<String>),
}

impl FieldChange {
    pub(crate) fn apply_to(self, node: &mut TreeNode) {
        match self {
            FieldChange::Role(role) => node.role = role,
            FieldChange::Name(name) => node.name = name,
            FieldChange::Value(value) => node.value = value,
            FieldChange::Properties(properties) => node.properties = properties,
            FieldChange::BoundingBox(bounding_box) => node.bounding_box = bounding_box,
            FieldChange::Attributes(attributes) => node.attributes = attributes,
            FieldChange::States(states) => node.states = states,
        }
    }
}

/// Why a patch step could not be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    #[error("unsupported delta version {0}")]
    UnsupportedVersion(u32),

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("index {index} out of bounds for parent {parent_id} with {len} children")]
    IndexOutOfBounds {
        parent_id: NodeId,
        index: usize,
        len: usize,
    },

    #[error("moving node {id} under {parent_id} would create a cycle")]
    Cycle { id: NodeId, parent_id: NodeId },

    #[error("root node {0} cannot be removed or moved")]
    RootImmutable(NodeId),
}
