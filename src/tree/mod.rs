//! Accessibility tree data model.
//!
//! A snapshot exists in two shapes: a flat node table as delivered by the
//! capture side (`Node`, with `parentId`/`childIds` references) and a rooted
//! tree (`TreeNode`, with owned `children`). [`normalize`] converts between
//! the two.

mod normalize;

pub use normalize::{build_tree, flatten_tree, validate_tree};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::now_ms;

/// Backend node identity. Unique within one snapshot only.
pub type NodeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Flat-table form of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub backend_node_id: NodeId,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub states: BTreeSet<String>,
}

impl Node {
    pub fn new(backend_node_id: NodeId, role: impl Into<String>) -> Self {
        Self {
            backend_node_id,
            role: role.into(),
            name: None,
            value: None,
            parent_id: None,
            child_ids: Vec::new(),
            properties: BTreeMap::new(),
            bounding_box: None,
            attributes: BTreeMap::new(),
            states: BTreeSet::new(),
        }
    }
}

/// Tree form of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub backend_node_id: NodeId,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub states: BTreeSet<String>,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(backend_node_id: NodeId, role: impl Into<String>) -> Self {
        Self {
            backend_node_id,
            role: role.into(),
            name: None,
            value: None,
            properties: BTreeMap::new(),
            bounding_box: None,
            attributes: BTreeMap::new(),
            states: BTreeSet::new(),
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.states.insert(state.into());
        self
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first search by id.
    pub fn find(&self, id: NodeId) -> Option<&TreeNode> {
        if self.backend_node_id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }

    /// Copy of the content fields with no children attached.
    pub fn detached(&self) -> TreeNode {
        TreeNode {
            backend_node_id: self.backend_node_id,
            role: self.role.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
            properties: self.properties.clone(),
            bounding_box: self.bounding_box,
            attributes: self.attributes.clone(),
            states: self.states.clone(),
            children: Vec::new(),
        }
    }
}

/// A complete tree state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub timestamp: u64,
    pub tree: TreeNode,
    pub flat_nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Snapshot {
    /// Snapshot stamped with the current time. The flat table is derived
    /// from `tree`.
    pub fn new(tree: TreeNode, url: Option<String>, title: Option<String>) -> Self {
        Self::at(now_ms(), tree, url, title)
    }

    pub fn at(timestamp: u64, tree: TreeNode, url: Option<String>, title: Option<String>) -> Self {
        let flat_nodes = flatten_tree(&tree);
        Self {
            timestamp,
            tree,
            flat_nodes,
            url,
            title,
        }
    }

    /// Builds a snapshot from a capture-side node table.
    pub fn from_flat_nodes(
        nodes: &[Node],
        url: Option<String>,
        title: Option<String>,
    ) -> Result<Self> {
        let tree = build_tree(nodes).ok_or(Error::EmptySnapshot)?;
        Ok(Self::new(tree, url, title))
    }

    /// Replaces the tree and re-derives the flat table.
    pub fn set_tree(&mut self, tree: TreeNode) {
        self.flat_nodes = flatten_tree(&tree);
        self.tree = tree;
    }
}
