use std::path::Path;

use axscope::{Node, NodeId, TreeNode};
use serde_json::json;

/// Login form with a configurable submit label.
pub fn login_page(submit_label: &str) -> TreeNode {
    TreeNode::new(1, "document").with_children(vec![
        TreeNode::new(2, "heading").with_name("Sign in"),
        TreeNode::new(3, "form").with_children(vec![
            TreeNode::new(4, "textbox").with_name("Email").with_value(""),
            TreeNode::new(5, "button").with_name(submit_label),
        ]),
    ])
}

/// Same page after the form was replaced by an error dialog that adopted
/// the submit button.
pub fn login_error_page() -> TreeNode {
    TreeNode::new(1, "document").with_children(vec![
        TreeNode::new(6, "dialog")
            .with_name("Invalid email")
            .with_children(vec![TreeNode::new(5, "button").with_name("Retry")]),
        TreeNode::new(2, "heading").with_name("Sign in"),
    ])
}

pub fn flat_node(
    id: NodeId,
    role: &str,
    name: Option<&str>,
    parent: Option<NodeId>,
    children: &[NodeId],
) -> Node {
    let mut node = Node::new(id, role);
    node.name = name.map(str::to_string);
    node.parent_id = parent;
    node.child_ids = children.to_vec();
    node
}

/// Write a `{url, nodes}` capture file.
pub fn write_capture_file(path: &Path, url: &str, nodes: &[Node]) {
    let body = json!({ "url": url, "nodes": nodes });
    std::fs::write(path, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
}
