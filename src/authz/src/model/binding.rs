//! Bindings attach a role or a single permission to a subject, optionally
//! narrowed to a resource and guarded by a caveat.

use super::{default_true, default_version};
use crate::caveat::Caveat;
use crate::types::{new_id, OrganizationId, PermissionId, RoleId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingSubject {
    User,
    Group,
    Service,
}

/// What a binding grants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum BindingTarget {
    Role(RoleId),
    Permission(PermissionId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub id: String,
    pub subject_id: String,
    pub subject_type: BindingSubject,
    pub target: BindingTarget,
    pub resource_type: String,
    /// `None` applies the binding to every resource of `resource_type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub organization_id: OrganizationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveat: Option<Caveat>,
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Binding {
    pub fn new(
        subject_type: BindingSubject,
        subject_id: impl Into<String>,
        target: BindingTarget,
        resource_type: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            subject_id: subject_id.into(),
            subject_type,
            target,
            resource_type: resource_type.into(),
            resource_id: None,
            organization_id: organization_id.into(),
            caveat: None,
            version: 1,
            created_by: String::new(),
            is_active: true,
        }
    }

    /// Bind a role to a user
    pub fn user_role(
        user_id: impl Into<String>,
        role_id: impl Into<String>,
        resource_type: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self::new(
            BindingSubject::User,
            user_id,
            BindingTarget::Role(role_id.into()),
            resource_type,
            organization_id,
        )
    }

    pub fn on_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_caveat(mut self, caveat: Caveat) -> Self {
        self.caveat = Some(caveat);
        self
    }

    /// Binding scope covers the requested resource
    pub fn applies_to(&self, resource_type: &str, resource_id: &str) -> bool {
        self.resource_type == resource_type
            && self
                .resource_id
                .as_deref()
                .map_or(true, |bound| bound == resource_id)
    }

    pub fn role_id(&self) -> Option<&str> {
        match &self.target {
            BindingTarget::Role(id) => Some(id),
            BindingTarget::Permission(_) => None,
        }
    }
}
