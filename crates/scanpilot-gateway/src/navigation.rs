//! Business-unit / application navigation tree

use serde::{Deserialize, Serialize};

/// Node of the service's navigation tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(deserialize_with = "crate::types::id_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, node: TreeNode) -> Self {
        self.children.push(node);
        self
    }
}

/// Split a `\Unit\Sub\Team` path into trimmed, non-empty segments
pub fn path_segments(team_path: &str) -> Vec<&str> {
    team_path
        .split('\\')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolve a team path to a node id by matching titles level by level
pub fn find_team_id(roots: &[TreeNode], team_path: &str) -> Option<String> {
    let segments = path_segments(team_path);
    if segments.is_empty() {
        return None;
    }
    descend(roots, &segments)
}

fn descend(nodes: &[TreeNode], segments: &[&str]) -> Option<String> {
    let (head, rest) = segments.split_first()?;
    nodes
        .iter()
        .filter(|node| node.title.trim() == *head)
        .find_map(|node| {
            if rest.is_empty() {
                Some(node.id.clone())
            } else {
                descend(&node.children, rest)
            }
        })
}
