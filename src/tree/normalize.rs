use std::collections::{HashMap, HashSet};

use super::{Node, NodeId, TreeNode};

/// Builds a rooted tree from a flat node table.
///
/// Returns `None` for an empty table. The root is the first node that has no
/// parent, or whose parent is not in the table; when every node claims a
/// known parent the first listed node is used. Child references to unknown
/// ids are dropped. A node reachable twice (a cycle or a shared child) is
/// only attached at its first position.
pub fn build_tree(nodes: &[Node]) -> Option<TreeNode> {
    let first = nodes.first()?;

    let by_id: HashMap<NodeId, &Node> = nodes
        .iter()
        .map(|node| (node.backend_node_id, node))
        .collect();

    let candidates: Vec<&Node> = nodes
        .iter()
        .filter(|node| match node.parent_id {
            None => true,
            Some(parent) => !by_id.contains_key(&parent),
        })
        .collect();
    let root = candidates.first().copied().unwrap_or(first);
    if candidates.len() > 1 {
        tracing::debug!(
            roots = candidates.len(),
            root = root.backend_node_id,
            "multiple root candidates in node table, using the first"
        );
    }

    let mut visited = HashSet::new();
    Some(attach(root, &by_id, &mut visited))
}

fn attach(node: &Node, by_id: &HashMap<NodeId, &Node>, visited: &mut HashSet<NodeId>) -> TreeNode {
    visited.insert(node.backend_node_id);
    let mut tree = TreeNode {
        backend_node_id: node.backend_node_id,
        role: node.role.clone(),
        name: node.name.clone(),
        value: node.value.clone(),
        properties: node.properties.clone(),
        bounding_box: node.bounding_box,
        attributes: node.attributes.clone(),
        states: node.states.clone(),
        children: Vec::with_capacity(node.child_ids.len()),
    };
    for child_id in &node.child_ids {
        if visited.contains(child_id) {
            continue;
        }
        if let Some(child) = by_id.get(child_id) {
            tree.children.push(attach(child, by_id, visited));
        }
    }
    tree
}

/// Flattens a tree into pre-order node table form.
pub fn flatten_tree(tree: &TreeNode) -> Vec<Node> {
    let mut out = Vec::with_capacity(tree.node_count());
    flatten_into(tree, None, &mut out);
    out
}

fn flatten_into(tree: &TreeNode, parent_id: Option<NodeId>, out: &mut Vec<Node>) {
    out.push(Node {
        backend_node_id: tree.backend_node_id,
        role: tree.role.clone(),
        name: tree.name.clone(),
        value: tree.value.clone(),
        parent_id,
        child_ids: tree.children.iter().map(|c| c.backend_node_id).collect(),
        properties: tree.properties.clone(),
        bounding_box: tree.bounding_box,
        attributes: tree.attributes.clone(),
        states: tree.states.clone(),
    });
    for child in &tree.children {
        flatten_into(child, Some(tree.backend_node_id), out);
    }
}

/// Structural gate for externally supplied trees: every node needs a
/// non-zero id and a non-empty role.
pub fn validate_tree(tree: &TreeNode) -> bool {
    tree.backend_node_id != 0
        && !tree.role.is_empty()
        && tree.children.iter().all(validate_tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn flat(id: NodeId, role: &str, parent: Option<NodeId>, children: &[NodeId]) -> Node {
        let mut node = Node::new(id, role);
        node.parent_id = parent;
        node.child_ids = children.to_vec();
        node
    }

    #[test]
    fn builds_document_with_button() {
        let nodes = vec![
            flat(1, "document", None, &[2]),
            flat(2, "button", Some(1), &[]),
        ];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.backend_node_id, 1);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].backend_node_id, 2);
        assert_eq!(tree.children[0].role, "button");
    }

    #[test]
    fn empty_table_builds_nothing() {
        assert!(build_tree(&[]).is_none());
    }

    #[test]
    fn parent_outside_table_marks_root() {
        let nodes = vec![
            flat(5, "listitem", Some(4), &[]),
            flat(4, "list", Some(99), &[5]),
        ];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.backend_node_id, 4);
        assert_eq!(tree.children[0].backend_node_id, 5);
    }

    #[test]
    fn falls_back_to_first_node_without_root_candidate() {
        let nodes = vec![flat(1, "group", Some(2), &[2]), flat(2, "group", Some(1), &[1])];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.backend_node_id, 1);
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());
    }

    #[test]
    fn unknown_child_ids_are_dropped() {
        let nodes = vec![flat(1, "document", None, &[2, 42]), flat(2, "text", Some(1), &[])];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn flatten_is_preorder_with_edges() {
        let tree = TreeNode::new(1, "document").with_children(vec![
            TreeNode::new(2, "list").with_children(vec![TreeNode::new(3, "listitem")]),
            TreeNode::new(4, "button"),
        ]);
        let nodes = flatten_tree(&tree);
        let ids: Vec<_> = nodes.iter().map(|n| n.backend_node_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(nodes[0].child_ids, vec![2, 4]);
        assert_eq!(nodes[2].parent_id, Some(2));
        assert_eq!(nodes[0].parent_id, None);
    }

    #[test]
    fn validation_rejects_zero_id_and_empty_role() {
        let good = TreeNode::new(1, "document").with_children(vec![TreeNode::new(2, "button")]);
        assert!(validate_tree(&good));

        let zero = TreeNode::new(1, "document").with_children(vec![TreeNode::new(0, "button")]);
        assert!(!validate_tree(&zero));

        let unnamed_role = TreeNode::new(3, "");
        assert!(!validate_tree(&unnamed_role));
    }

    fn edges(nodes: &[Node]) -> BTreeSet<(NodeId, NodeId)> {
        nodes
            .iter()
            .flat_map(|n| n.child_ids.iter().map(move |c| (n.backend_node_id, *c)))
            .collect()
    }

    /// Random consistent node tables: node `i` hangs under some earlier node.
    fn arb_table() -> impl Strategy<Value = Vec<Node>> {
        prop::collection::vec(any::<prop::sample::Index>(), 0..24).prop_map(|parents| {
            let mut nodes = vec![flat(1, "document", None, &[])];
            for (i, parent) in parents.iter().enumerate() {
                let id = i as NodeId + 2;
                let parent_idx = parent.index(nodes.len());
                let parent_id = nodes[parent_idx].backend_node_id;
                nodes[parent_idx].child_ids.push(id);
                nodes.push(flat(id, "generic", Some(parent_id), &[]));
            }
            nodes
        })
    }

    proptest! {
        #[test]
        fn build_then_flatten_preserves_ids_and_edges(mut nodes in arb_table()) {
            // table order must not matter beyond the root
            nodes[1..].reverse();
            let tree = build_tree(&nodes).unwrap();
            let round = flatten_tree(&tree);

            let before: BTreeSet<_> = nodes.iter().map(|n| n.backend_node_id).collect();
            let after: BTreeSet<_> = round.iter().map(|n| n.backend_node_id).collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(edges(&nodes), edges(&round));
        }
    }
}
