use std::collections::HashMap;

use super::{ApplyError, Delta, PatchOp, DELTA_FORMAT_VERSION};
use crate::tree::{NodeId, TreeNode};

/// Applies `delta` to a copy of `tree`.
pub fn apply_delta(tree: &TreeNode, delta: &Delta) -> Result<TreeNode, ApplyError> {
    if delta.version != DELTA_FORMAT_VERSION {
        return Err(ApplyError::UnsupportedVersion(delta.version));
    }
    if delta.is_empty() {
        return Ok(tree.clone());
    }

    let mut arena = Arena::from_tree(tree)?;
    for op in &delta.ops {
        arena.apply(op.clone())?;
    }
    Ok(arena.into_tree())
}

struct Slot {
    /// Content only; structure lives in `parent`/`children`.
    node: TreeNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Id-addressed working copy of a tree.
pub(super) struct Arena {
    root: NodeId,
    slots: HashMap<NodeId, Slot>,
}

impl Arena {
    pub(super) fn from_tree(tree: &TreeNode) -> Result<Self, ApplyError> {
        let mut arena = Self {
            root: tree.backend_node_id,
            slots: HashMap::with_capacity(tree.node_count()),
        };
        arena.insert_subtree(tree, None)?;
        Ok(arena)
    }

    pub(super) fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Current `(parent, index)` of a node, `None` for the root or a
    /// detached node.
    pub(super) fn position(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.slots.get(&id)?.parent?;
        let index = self
            .slots
            .get(&parent)?
            .children
            .iter()
            .position(|c| *c == id)?;
        Some((parent, index))
    }

    pub(super) fn apply(&mut self, op: PatchOp) -> Result<(), ApplyError> {
        match op {
            PatchOp::ReplaceRoot { tree } => {
                *self = Arena::from_tree(&tree)?;
                Ok(())
            }
            PatchOp::RemoveNode { id } => self.remove(id),
            PatchOp::AddNode {
                parent_id,
                index,
                node,
            } => self.add(parent_id, index, &node),
            PatchOp::MoveNode {
                id,
                parent_id,
                index,
            } => self.move_node(id, parent_id, index),
            PatchOp::SetField { id, change } => {
                let slot = self.slots.get_mut(&id).ok_or(ApplyError::UnknownNode(id))?;
                change.apply_to(&mut slot.node);
                Ok(())
            }
        }
    }

    pub(super) fn into_tree(mut self) -> TreeNode {
        let root = self.root;
        self.take_subtree(root)
            .unwrap_or_else(|| TreeNode::new(root, String::new()))
    }

    fn insert_subtree(&mut self, tree: &TreeNode, parent: Option<NodeId>) -> Result<(), ApplyError> {
        let id = tree.backend_node_id;
        if self.slots.contains_key(&id) {
            return Err(ApplyError::DuplicateNode(id));
        }
        self.slots.insert(
            id,
            Slot {
                node: tree.detached(),
                parent,
                children: tree.children.iter().map(|c| c.backend_node_id).collect(),
            },
        );
        for child in &tree.children {
            self.insert_subtree(child, Some(id))?;
        }
        Ok(())
    }

    fn take_subtree(&mut self, id: NodeId) -> Option<TreeNode> {
        let slot = self.slots.remove(&id)?;
        let mut node = slot.node;
        node.children = slot
            .children
            .into_iter()
            .filter_map(|child| self.take_subtree(child))
            .collect();
        Some(node)
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.slots.get_mut(&id).and_then(|slot| slot.parent.take()) else {
            return;
        };
        if let Some(parent_slot) = self.slots.get_mut(&parent) {
            parent_slot.children.retain(|c| *c != id);
        }
    }

    fn attach(&mut self, id: NodeId, parent_id: NodeId, index: usize) -> Result<(), ApplyError> {
        let parent = self
            .slots
            .get_mut(&parent_id)
            .ok_or(ApplyError::UnknownNode(parent_id))?;
        if index > parent.children.len() {
            return Err(ApplyError::IndexOutOfBounds {
                parent_id,
                index,
                len: parent.children.len(),
            });
        }
        parent.children.insert(index, id);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.parent = Some(parent_id);
        }
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<(), ApplyError> {
        if id == self.root {
            return Err(ApplyError::RootImmutable(id));
        }
        if !self.slots.contains_key(&id) {
            return Err(ApplyError::UnknownNode(id));
        }
        self.detach(id);
        if let Some(slot) = self.slots.remove(&id) {
            for child in slot.children {
                if let Some(child_slot) = self.slots.get_mut(&child) {
                    child_slot.parent = None;
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, parent_id: NodeId, index: usize, node: &TreeNode) -> Result<(), ApplyError> {
        let len = self
            .slots
            .get(&parent_id)
            .ok_or(ApplyError::UnknownNode(parent_id))?
            .children
            .len();
        if index > len {
            return Err(ApplyError::IndexOutOfBounds {
                parent_id,
                index,
                len,
            });
        }
        self.insert_subtree(node, None)?;
        self.attach(node.backend_node_id, parent_id, index)
    }

    fn move_node(&mut self, id: NodeId, parent_id: NodeId, index: usize) -> Result<(), ApplyError> {
        if id == self.root {
            return Err(ApplyError::RootImmutable(id));
        }
        if !self.slots.contains_key(&id) {
            return Err(ApplyError::UnknownNode(id));
        }
        if !self.slots.contains_key(&parent_id) {
            return Err(ApplyError::UnknownNode(parent_id));
        }

        let mut cursor = Some(parent_id);
        while let Some(current) = cursor {
            if current == id {
                return Err(ApplyError::Cycle { id, parent_id });
            }
            cursor = self.slots.get(&current).and_then(|slot| slot.parent);
        }

        let previous = self.position(id);
        self.detach(id);
        if let Err(err) = self.attach(id, parent_id, index) {
            // put it back so a failed step leaves the arena unchanged
            if let Some((old_parent, old_index)) = previous {
                let _ = self.attach(id, old_parent, old_index);
            }
            return Err(err);
        }
        Ok(())
    }
}
