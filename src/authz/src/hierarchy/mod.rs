//! Effective role resolution
//!
//! Expands a principal into every role it holds at evaluation time by
//! walking role parentage, group membership and inheritance, organization
//! defaults and role bindings. Every walk is an explicit loop with a visited
//! set and a hard depth ceiling, so corrupt or cyclic data always terminates.

pub mod graph;
pub mod resolver;

pub use graph::{GraphError, RoleGraph, RoleNode};
pub use resolver::HierarchyResolver;

use crate::model::{Binding, Role};
use crate::types::{GroupId, OrganizationId, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default traversal ceiling, matching the group nesting bound
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// How a role was reached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Provenance {
    Direct,
    ViaGroup { group_id: GroupId },
    ViaOrganization { organization_id: OrganizationId },
    ViaParent { child_role_id: RoleId },
    ViaBinding { binding_id: String },
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Direct => write!(f, "direct"),
            Provenance::ViaGroup { group_id } => write!(f, "via-group:{}", group_id),
            Provenance::ViaOrganization { organization_id } => {
                write!(f, "via-org:{}", organization_id)
            }
            Provenance::ViaParent { child_role_id } => write!(f, "via-parent:{}", child_role_id),
            Provenance::ViaBinding { binding_id } => write!(f, "via-binding:{}", binding_id),
        }
    }
}

/// A role in the effective set plus every path that reached it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveRole {
    pub role: Role,
    pub provenance: Vec<Provenance>,
    /// Parent hops from the nearest seed
    pub depth: usize,
}

/// Roles that only grant when a binding's caveat passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalGrant {
    pub binding: Binding,
    /// Bound role and its ancestors; empty for permission bindings
    pub roles: Vec<EffectiveRole>,
}

/// Deduplicated result of hierarchy resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectiveRoleSet {
    /// Unconditionally held roles, in discovery order
    pub roles: Vec<EffectiveRole>,
    /// Binding-mediated grants, ordered by binding ID
    pub conditional: Vec<ConditionalGrant>,
    /// A cycle or the depth ceiling cut a branch short
    pub truncated: bool,
    /// First upcoming start or end among the windows consulted while
    /// resolving; the set must not be reused at or after this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl EffectiveRoleSet {
    /// No unconditional role and no role binding
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.conditional.iter().all(|grant| grant.roles.is_empty())
    }

    pub fn contains(&self, role_id: &str) -> bool {
        self.all_roles().any(|er| er.role.id == role_id)
    }

    pub fn role_ids(&self) -> Vec<RoleId> {
        self.roles.iter().map(|er| er.role.id.clone()).collect()
    }

    /// Unconditional roles followed by every binding-mediated role
    pub fn all_roles(&self) -> impl Iterator<Item = &EffectiveRole> {
        self.roles
            .iter()
            .chain(self.conditional.iter().flat_map(|grant| grant.roles.iter()))
    }

    pub fn get(&self, role_id: &str) -> Option<&EffectiveRole> {
        self.all_roles().find(|er| er.role.id == role_id)
    }
}
