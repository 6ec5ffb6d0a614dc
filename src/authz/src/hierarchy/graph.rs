//! Role parentage graph for administrative checks
//!
//! Built from a role listing, it answers the questions the mutation layer
//! asks before re-parenting a role: would the edge close a cycle, and would
//! the resulting chain exceed the depth ceiling. It also builds the display
//! tree.

use crate::model::Role;
use crate::types::RoleId;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Graph-related errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Existing data already contains a parent cycle
    #[error("Circular role parentage: {0}")]
    CircularDependency(String),

    /// Referenced role is absent from the graph
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

#[derive(Debug, Clone)]
struct GraphNode {
    role: Role,
    children: Vec<RoleId>,
}

/// A role with its children, for hierarchy display
#[derive(Debug, Clone, Serialize)]
pub struct RoleNode {
    pub role: Role,
    pub children: Vec<RoleNode>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    nodes: BTreeMap<RoleId, GraphNode>,
}

impl RoleGraph {
    /// Build the graph from live roles; edges to missing parents are dropped
    pub fn from_roles(roles: &[Role]) -> Self {
        let mut nodes: BTreeMap<RoleId, GraphNode> = roles
            .iter()
            .filter(|r| r.is_live())
            .map(|r| {
                (
                    r.id.clone(),
                    GraphNode {
                        role: r.clone(),
                        children: Vec::new(),
                    },
                )
            })
            .collect();

        let edges: Vec<(RoleId, RoleId)> = nodes
            .values()
            .filter_map(|n| n.role.parent_id.clone().map(|p| (p, n.role.id.clone())))
            .collect();
        for (parent, child) in edges {
            if let Some(node) = nodes.get_mut(&parent) {
                node.children.push(child);
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn parent_of(&self, role_id: &str) -> Option<&str> {
        self.nodes
            .get(role_id)
            .and_then(|n| n.role.parent_id.as_deref())
            .filter(|p| self.nodes.contains_key(*p))
    }

    /// Number of ancestors above `role_id`
    pub fn depth_of(&self, role_id: &str) -> Result<usize, GraphError> {
        if !self.nodes.contains_key(role_id) {
            return Err(GraphError::UnknownRole(role_id.to_string()));
        }
        let mut depth = 0;
        let mut current = role_id;
        while let Some(parent) = self.parent_of(current) {
            depth += 1;
            if depth > self.nodes.len() {
                return Err(GraphError::CircularDependency(role_id.to_string()));
            }
            current = parent;
        }
        Ok(depth)
    }

    /// Longest chain of descendants below `role_id`
    pub fn height_below(&self, role_id: &str) -> usize {
        let mut height = 0;
        let mut frontier = vec![(role_id.to_string(), 0usize)];
        while let Some((current, level)) = frontier.pop() {
            if level > self.nodes.len() {
                break;
            }
            height = height.max(level);
            if let Some(node) = self.nodes.get(&current) {
                frontier.extend(node.children.iter().map(|c| (c.clone(), level + 1)));
            }
        }
        height
    }

    /// True if `new_parent` is `child` or one of its descendants
    pub fn would_create_cycle(&self, child: &str, new_parent: &str) -> bool {
        let mut current = Some(new_parent);
        let mut steps = 0;
        while let Some(id) = current {
            if id == child {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
            current = self.parent_of(id);
        }
        false
    }

    /// Length of the longest chain through `child` once re-parented
    pub fn chain_depth_with_parent(&self, child: &str, new_parent: &str) -> Result<usize, GraphError> {
        Ok(self.depth_of(new_parent)? + 1 + self.height_below(child))
    }

    /// Forest of roles rooted at roles without a parent, children by name
    pub fn tree(&self) -> Vec<RoleNode> {
        let mut roots: Vec<&GraphNode> = self
            .nodes
            .values()
            .filter(|n| self.parent_of(&n.role.id).is_none())
            .collect();
        roots.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        roots.into_iter().map(|n| self.build_node(n, 0)).collect()
    }

    fn build_node(&self, node: &GraphNode, level: usize) -> RoleNode {
        let mut children: Vec<RoleNode> = if level < self.nodes.len() {
            node.children
                .iter()
                .filter_map(|c| self.nodes.get(c))
                .map(|c| self.build_node(c, level + 1))
                .collect()
        } else {
            Vec::new()
        };
        children.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        RoleNode {
            role: node.role.clone(),
            children,
        }
    }
}
