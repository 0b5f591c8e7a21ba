use std::collections::{BTreeSet, HashMap};

use super::apply::Arena;
use super::{ApplyError, Delta, FieldChange, PatchOp};
use crate::tree::{NodeId, TreeNode};

/// Key-sorted JSON rendering of a tree.
///
/// `serde_json::Value` objects are ordered maps, so two trees that differ
/// only in incidental map ordering render identically.
pub fn canonical_json(tree: &TreeNode) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(tree)?;
    serde_json::to_string(&value)
}

/// Equality on canonical JSON, so map ordering never counts as a change.
pub fn canonically_equal(prev: &TreeNode, next: &TreeNode) -> bool {
    match (canonical_json(prev), canonical_json(next)) {
        (Ok(a), Ok(b)) => a == b,
        _ => prev == next,
    }
}

/// Computes the patch turning `prev` into `next`.
///
/// Returns the empty delta when both trees are canonically identical.
pub fn compute_delta(prev: &TreeNode, next: &TreeNode) -> Delta {
    if canonically_equal(prev, next) {
        return Delta::empty();
    }
    if prev.backend_node_id != next.backend_node_id {
        return replace_root(next);
    }

    match plan(prev, next) {
        Ok(ops) => Delta::from_ops(ops),
        Err(err) => {
            tracing::warn!(
                error = %err,
                "identity diff failed, falling back to full tree replacement"
            );
            replace_root(next)
        }
    }
}

fn replace_root(next: &TreeNode) -> Delta {
    Delta::from_ops(vec![PatchOp::ReplaceRoot { tree: next.clone() }])
}

/// Emits ops while replaying them on a working arena, so every positional
/// index refers to the state produced by the ops before it.
fn plan(prev: &TreeNode, next: &TreeNode) -> Result<Vec<PatchOp>, ApplyError> {
    let mut work = Arena::from_tree(prev)?;
    let target = index(next)?;
    let mut ops = Vec::new();

    let mut emit = |work: &mut Arena, op: PatchOp| -> Result<(), ApplyError> {
        work.apply(op.clone())?;
        ops.push(op);
        Ok(())
    };

    for node in preorder(prev) {
        if !target.contains_key(&node.backend_node_id) {
            emit(&mut work, PatchOp::RemoveNode {
                id: node.backend_node_id,
            })?;
        }
    }

    let before = index(prev)?;
    for node in preorder(next) {
        if let Some(old) = before.get(&node.backend_node_id) {
            for change in field_changes(old, node) {
                emit(&mut work, PatchOp::SetField {
                    id: node.backend_node_id,
                    change,
                })?;
            }
        }
    }

    // Parents are visited before their children, so each parent already sits
    // at its final position when its child list is laid out.
    for parent in preorder(next) {
        for (index, child) in parent.children.iter().enumerate() {
            let id = child.backend_node_id;
            if !work.contains(id) {
                emit(&mut work, PatchOp::AddNode {
                    parent_id: parent.backend_node_id,
                    index,
                    node: child.detached(),
                })?;
            } else if work.position(id) != Some((parent.backend_node_id, index)) {
                emit(&mut work, PatchOp::MoveNode {
                    id,
                    parent_id: parent.backend_node_id,
                    index,
                })?;
            }
        }
    }

    Ok(ops)
}

fn field_changes(old: &TreeNode, new: &TreeNode) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    if old.role != new.role {
        changes.push(FieldChange::Role(new.role.clone()));
    }
    if old.name != new.name {
        changes.push(FieldChange::Name(new.name.clone()));
    }
    if old.value != new.value {
        changes.push(FieldChange::Value(new.value.clone()));
    }
    if old.properties != new.properties {
        changes.push(FieldChange::Properties(new.properties.clone()));
    }
    if old.bounding_box != new.bounding_box {
        changes.push(FieldChange::BoundingBox(new.bounding_box));
    }
    if old.attributes != new.attributes {
        changes.push(FieldChange::Attributes(new.attributes.clone()));
    }
    if old.states != new.states {
        changes.push(FieldChange::States(new.states.clone()));
    }
    changes
}

fn preorder(tree: &TreeNode) -> Vec<&TreeNode> {
    let mut out = Vec::new();
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}

fn index(tree: &TreeNode) -> Result<HashMap<NodeId, &TreeNode>, ApplyError> {
    let mut map = HashMap::new();
    for node in preorder(tree) {
        if map.insert(node.backend_node_id, node).is_some() {
            return Err(ApplyError::DuplicateNode(node.backend_node_id));
        }
    }
    Ok(map)
}

/// Ids present in only one tree, or whose (role, name, value) differs.
pub fn extract_changed_node_ids(prev: &TreeNode, next: &TreeNode) -> BTreeSet<NodeId> {
    fn triples(tree: &TreeNode) -> HashMap<NodeId, (&str, Option<&str>, Option<&str>)> {
        preorder(tree)
            .into_iter()
            .map(|n| {
                (
                    n.backend_node_id,
                    (n.role.as_str(), n.name.as_deref(), n.value.as_deref()),
                )
            })
            .collect()
    }

    let before = triples(prev);
    let after = triples(next);
    before
        .keys()
        .chain(after.keys())
        .filter(|id| before.get(id) != after.get(id))
        .copied()
        .collect()
}
