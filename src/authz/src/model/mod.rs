//! Access-control entities
//!
//! Every entity is created through a constructor that stamps a fresh ID,
//! `version = 1` and `is_active = true`. Mutation happens through the store's
//! version-checked updates; deletion is a soft delete that clears `is_active`.

pub mod attribute;
pub mod binding;
pub mod group;
pub mod permission;
pub mod role;

pub use attribute::{Attribute, AttributeSubject};
pub use binding::{Binding, BindingSubject, BindingTarget};
pub use group::{Group, GroupInheritance, GroupMembership, GroupRole, MAX_GROUP_DEPTH};
pub use permission::{Action, Permission, Resource, ResourcePermission, RolePermission};
pub use role::{Role, RoleScope, UserRole};

use crate::types::{new_id, OrganizationId, PrincipalId};
use serde::{Deserialize, Serialize};

pub(crate) fn default_version() -> u64 {
    1
}

pub(crate) fn default_true() -> bool {
    true
}

/// Kind of identity that can hold roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Service,
}

/// A user or service identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PrincipalKind::User,
            organization_id: None,
            is_active: true,
        }
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Service,
            ..Self::user(id)
        }
    }

    pub fn in_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

/// Hierarchical tenant boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<OrganizationId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            parent_id: None,
            is_active: true,
        }
    }

    pub fn child_of(name: impl Into<String>, parent: &Organization) -> Self {
        Self {
            parent_id: Some(parent.id.clone()),
            ..Self::new(name)
        }
    }
}
