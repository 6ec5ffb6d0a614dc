//! Grant records for both permission models
//!
//! Model 1 binds a reusable [`Permission`] (resource reference + action
//! reference) to roles through [`RolePermission`]. Model 2 grants a role an
//! action on a resource directly through [`ResourcePermission`].

use super::{default_true, default_version};
use crate::types::{new_id, PermissionId, RoleId, WILDCARD_RESOURCE_ID};
use serde::{Deserialize, Serialize};

/// Resource reference a named permission points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub resource_type: String,
    /// `None` makes the reference type-level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl Resource {
    pub fn of_type(resource_type: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            resource_type: resource_type.into(),
            object_id: None,
        }
    }

    pub fn object(resource_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_id: Some(object_id.into()),
            ..Self::of_type(resource_type)
        }
    }

    /// Exact type match, and exact object match unless type-level
    pub fn denotes(&self, resource_type: &str, resource_id: &str) -> bool {
        self.resource_type == resource_type
            && self
                .object_id
                .as_deref()
                .map_or(true, |object_id| object_id == resource_id)
    }
}

/// Action reference a named permission points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
        }
    }
}

/// Named permission (Model 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Permission {
    pub fn new(name: impl Into<String>, resource: &Resource, action: &Action) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: String::new(),
            resource_id: Some(resource.id.clone()),
            action_id: Some(action.id.clone()),
            version: 1,
            is_active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Role-to-permission link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: String,
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl RolePermission {
    pub fn new(role_id: impl Into<String>, permission_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role_id: role_id.into(),
            permission_id: permission_id.into(),
            is_active: true,
        }
    }
}

/// Direct resource grant (Model 2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermission {
    pub id: String,
    pub role_id: RoleId,
    pub resource_type: String,
    /// `"*"` or empty grants every resource of the type
    #[serde(default)]
    pub resource_id: String,
    pub action: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ResourcePermission {
    pub fn new(
        role_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            role_id: role_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: action.into(),
            is_active: true,
        }
    }

    /// Type-level grant covering every resource of `resource_type`
    pub fn type_level(
        role_id: impl Into<String>,
        resource_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(role_id, resource_type, WILDCARD_RESOURCE_ID, action)
    }

    pub fn is_type_level(&self) -> bool {
        self.resource_id.is_empty() || self.resource_id == WILDCARD_RESOURCE_ID
    }

    pub fn covers(&self, resource_type: &str, resource_id: &str, action: &str) -> bool {
        self.is_active
            && self.resource_type == resource_type
            && self.action == action
            && (self.is_type_level() || self.resource_id == resource_id)
    }
}
