//! Roles and direct role assignments

use super::{default_true, default_version};
use crate::error::{AuthzError, Result};
use crate::types::{new_id, GroupId, OrganizationId, PrincipalId, RoleId, TimeWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a role is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    Global,
    Org,
}

/// A named bundle of grants; roles form a forest through `parent_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scope: RoleScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RoleId>,
    /// Granted to everyone evaluated in the role's organization
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    /// Create a global role
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: String::new(),
            scope: RoleScope::Global,
            organization_id: None,
            parent_id: None,
            is_default: false,
            version: 1,
            is_active: true,
            deleted_at: None,
        }
    }

    /// Create a role scoped to one organization
    pub fn org(name: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            scope: RoleScope::Org,
            organization_id: Some(organization_id.into()),
            ..Self::global(name)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Active and not soft-deleted
    pub fn is_live(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// Check the scope invariant and basic shape
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(AuthzError::Validation("role id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AuthzError::Validation("role name is required".to_string()));
        }
        match (self.scope, &self.organization_id) {
            (RoleScope::Org, None) => {
                return Err(AuthzError::Validation(format!(
                    "org-scoped role {} must have an organization",
                    self.id
                )))
            }
            (RoleScope::Global, Some(_)) => {
                return Err(AuthzError::Validation(format!(
                    "global role {} cannot have an organization",
                    self.id
                )))
            }
            _ => {}
        }
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(AuthzError::Validation(format!(
                "role {} cannot be its own parent",
                self.id
            )));
        }
        Ok(())
    }

    /// Visible when evaluating in `organization_id`
    pub fn visible_in(&self, organization_id: &str) -> bool {
        match self.scope {
            RoleScope::Global => true,
            RoleScope::Org => self.organization_id.as_deref() == Some(organization_id),
        }
    }
}

/// Role held by a principal, either directly or materialized from a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: String,
    pub principal_id: PrincipalId,
    pub role_id: RoleId,
    /// Set when the row was materialized from a group role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_group_id: Option<GroupId>,
    #[serde(flatten)]
    pub window: TimeWindow,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl UserRole {
    pub fn new(principal_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            principal_id: principal_id.into(),
            role_id: role_id.into(),
            source_group_id: None,
            window: TimeWindow::unbounded(),
            is_active: true,
        }
    }

    pub fn inherited_from(mut self, group_id: impl Into<String>) -> Self {
        self.source_group_id = Some(group_id.into());
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.window.contains(at)
    }
}
