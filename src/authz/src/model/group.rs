//! Groups, memberships, group inheritance and group roles

use super::{default_true, PrincipalKind};
use crate::error::{AuthzError, Result};
use crate::types::{new_id, GroupId, OrganizationId, PrincipalId, RoleId, TimeWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deepest allowed group nesting (root is depth 0)
pub const MAX_GROUP_DEPTH: u8 = 8;

/// A group of principals inside one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub organization_id: OrganizationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GroupId>,
    #[serde(default)]
    pub hierarchy_depth: u8,
    /// Materialized root-to-node path, e.g. `/root-id/child-id`
    #[serde(default)]
    pub hierarchy_path: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Group {
    /// Create a top-level group
    pub fn root(name: impl Into<String>, organization_id: impl Into<String>) -> Self {
        let id = new_id();
        Self {
            hierarchy_path: format!("/{}", id),
            id,
            name: name.into(),
            organization_id: organization_id.into(),
            parent_id: None,
            hierarchy_depth: 0,
            is_active: true,
        }
    }

    /// Create a group nested under `parent`, deriving depth and path
    pub fn child_of(name: impl Into<String>, parent: &Group) -> Result<Self> {
        let depth = parent.hierarchy_depth + 1;
        if depth > MAX_GROUP_DEPTH {
            return Err(AuthzError::Validation(format!(
                "group hierarchy depth {} exceeds maximum {}",
                depth, MAX_GROUP_DEPTH
            )));
        }

        let id = new_id();
        Ok(Self {
            hierarchy_path: format!("{}/{}", parent.hierarchy_path, id),
            id,
            name: name.into(),
            organization_id: parent.organization_id.clone(),
            parent_id: Some(parent.id.clone()),
            hierarchy_depth: depth,
            is_active: true,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.hierarchy_depth > MAX_GROUP_DEPTH {
            return Err(AuthzError::Validation(format!(
                "group {} depth {} exceeds maximum {}",
                self.id, self.hierarchy_depth, MAX_GROUP_DEPTH
            )));
        }
        if (self.hierarchy_depth == 0) != self.parent_id.is_none() {
            return Err(AuthzError::Validation(format!(
                "group {} must have a parent exactly when its depth is non-zero",
                self.id
            )));
        }
        Ok(())
    }

    /// True if `other` sits in this group's subtree (including itself)
    pub fn contains(&self, other: &Group) -> bool {
        other.hierarchy_path == self.hierarchy_path
            || other
                .hierarchy_path
                .starts_with(&format!("{}/", self.hierarchy_path))
    }
}

/// Principal-in-group edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub id: String,
    pub group_id: GroupId,
    pub principal_id: PrincipalId,
    pub principal_kind: PrincipalKind,
    #[serde(flatten)]
    pub window: TimeWindow,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub added_by: String,
}

impl GroupMembership {
    pub fn new(group_id: impl Into<String>, principal_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            group_id: group_id.into(),
            principal_id: principal_id.into(),
            principal_kind: PrincipalKind::User,
            window: TimeWindow::unbounded(),
            is_active: true,
            added_by: String::new(),
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.window.contains(at)
    }
}

/// Parent-to-child group edge used to propagate group roles down a subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInheritance {
    pub id: String,
    pub parent_group_id: GroupId,
    pub child_group_id: GroupId,
    #[serde(flatten)]
    pub window: TimeWindow,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl GroupInheritance {
    pub fn new(parent_group_id: impl Into<String>, child_group_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            parent_group_id: parent_group_id.into(),
            child_group_id: child_group_id.into(),
            window: TimeWindow::unbounded(),
            is_active: true,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.window.contains(at)
    }
}

/// Role granted to every member of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRole {
    pub id: String,
    pub group_id: GroupId,
    pub role_id: RoleId,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub assigned_by: String,
    #[serde(flatten)]
    pub window: TimeWindow,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl GroupRole {
    pub fn new(group: &Group, role_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            group_id: group.id.clone(),
            role_id: role_id.into(),
            organization_id: group.organization_id.clone(),
            assigned_by: String::new(),
            window: TimeWindow::unbounded(),
            is_active: true,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.window.contains(at)
    }
}
