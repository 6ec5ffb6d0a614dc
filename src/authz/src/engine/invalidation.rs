//! Cache invalidation on mutation
//!
//! Writers describe what changed with an [`InvalidationEvent`]; the engine
//! maps it onto the role dependency index and the principal and group key
//! families. Failures are logged and swallowed: a missed invalidation only
//! delays consistency until the TTL runs out.

use super::DecisionEngine;
use crate::error::Result;
use crate::model::{Binding, BindingSubject, BindingTarget};
use crate::types::{GroupId, PermissionId, PrincipalId, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A mutation that may stale cached role sets or decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InvalidationEvent {
    RoleChanged {
        role_id: RoleId,
    },
    PermissionChanged {
        permission_id: PermissionId,
    },
    RolePermissionChanged {
        role_id: RoleId,
        permission_id: PermissionId,
    },
    ResourcePermissionChanged {
        role_id: RoleId,
    },
    BindingChanged {
        subject_type: BindingSubject,
        subject_id: String,
        target: BindingTarget,
    },
    GroupRoleChanged {
        group_id: GroupId,
        role_id: RoleId,
    },
    GroupMembershipChanged {
        group_id: GroupId,
        principal_id: PrincipalId,
    },
    GroupInheritanceChanged {
        parent_group_id: GroupId,
        child_group_id: GroupId,
    },
    UserRoleChanged {
        principal_id: PrincipalId,
        role_id: RoleId,
    },
    AttributeChanged {
        subject_id: String,
    },
}

impl InvalidationEvent {
    pub fn binding(binding: &Binding) -> Self {
        Self::BindingChanged {
            subject_type: binding.subject_type,
            subject_id: binding.subject_id.clone(),
            target: binding.target.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoleChanged { .. } => "role_changed",
            Self::PermissionChanged { .. } => "permission_changed",
            Self::RolePermissionChanged { .. } => "role_permission_changed",
            Self::ResourcePermissionChanged { .. } => "resource_permission_changed",
            Self::BindingChanged { .. } => "binding_changed",
            Self::GroupRoleChanged { .. } => "group_role_changed",
            Self::GroupMembershipChanged { .. } => "group_membership_changed",
            Self::GroupInheritanceChanged { .. } => "group_inheritance_changed",
            Self::UserRoleChanged { .. } => "user_role_changed",
            Self::AttributeChanged { .. } => "attribute_changed",
        }
    }
}

impl DecisionEngine {
    /// Drop every cached role set and decision `event` may have staled.
    ///
    /// Returns the number of cache entries removed. Never fails.
    pub async fn invalidate(&self, event: &InvalidationEvent) -> usize {
        if self.cache.is_none() {
            return 0;
        }

        let removed = match self.apply_invalidation(event).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Invalidation for {} incomplete: {}", event.kind(), e);
                0
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_invalidation(removed).await;
        }
        info!("Invalidated {} cache entries for {}", removed, event.kind());
        removed
    }

    async fn apply_invalidation(&self, event: &InvalidationEvent) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };

        let removed = match event {
            InvalidationEvent::RoleChanged { role_id } => {
                let mut removed = cache.invalidate_role(role_id).await;
                // A default role reaches principals whose cached sets never named it
                if let Some(role) = self.store.get_role(role_id).await? {
                    if role.is_default {
                        debug!("Default role {} changed, flushing all entries", role_id);
                        removed += cache.invalidate_all().await;
                    }
                }
                removed
            }
            InvalidationEvent::PermissionChanged { permission_id } => {
                let mut removed = 0;
                for role_id in self.roles_of_permission(permission_id).await? {
                    removed += cache.invalidate_role(&role_id).await;
                }
                let target = BindingTarget::Permission(permission_id.clone());
                for binding in self.store.bindings_for_target(&target).await? {
                    removed += self
                        .invalidate_subject(binding.subject_type, &binding.subject_id)
                        .await?;
                }
                removed
            }
            InvalidationEvent::RolePermissionChanged { role_id, .. }
            | InvalidationEvent::ResourcePermissionChanged { role_id } => {
                cache.invalidate_role(role_id).await
            }
            InvalidationEvent::BindingChanged {
                subject_type,
                subject_id,
                target,
            } => {
                let mut removed = match target {
                    BindingTarget::Role(role_id) => cache.invalidate_role(role_id).await,
                    BindingTarget::Permission(permission_id) => {
                        let mut removed = 0;
                        for role_id in self.roles_of_permission(permission_id).await? {
                            removed += cache.invalidate_role(&role_id).await;
                        }
                        removed
                    }
                };
                removed += self.invalidate_subject(*subject_type, subject_id).await?;
                removed
            }
            InvalidationEvent::GroupRoleChanged { group_id, role_id } => {
                cache.invalidate_role(role_id).await + self.invalidate_group_subtree(group_id).await?
            }
            InvalidationEvent::GroupMembershipChanged { group_id, principal_id } => {
                cache.invalidate_principal(principal_id).await
                    + cache.invalidate_group_context(group_id).await
            }
            InvalidationEvent::GroupInheritanceChanged { child_group_id, .. } => {
                self.invalidate_group_subtree(child_group_id).await?
            }
            InvalidationEvent::UserRoleChanged { principal_id, .. }
            | InvalidationEvent::AttributeChanged {
                subject_id: principal_id,
            } => cache.invalidate_principal(principal_id).await,
        };

        Ok(removed)
    }

    async fn roles_of_permission(&self, permission_id: &str) -> Result<BTreeSet<RoleId>> {
        Ok(self
            .store
            .role_permissions_by_permission_id(permission_id)
            .await?
            .into_iter()
            .map(|link| link.role_id)
            .collect())
    }

    async fn invalidate_subject(&self, subject_type: BindingSubject, subject_id: &str) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        match subject_type {
            BindingSubject::User | BindingSubject::Service => {
                Ok(cache.invalidate_principal(subject_id).await)
            }
            BindingSubject::Group => self.invalidate_group_subtree(subject_id).await,
        }
    }

    /// Every member of the group or a descendant group, and every context
    /// keyed on one of those groups
    async fn invalidate_group_subtree(&self, group_id: &str) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let mut removed = 0;
        for group in self.resolver.group_subtree(group_id).await? {
            removed += cache.invalidate_group_context(&group).await;
        }
        for principal in self.resolver.principals_in_subtree(group_id).await? {
            removed += cache.invalidate_principal(&principal).await;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_binding() {
        let binding = Binding::user_role("u1", "r1", "doc", "org-1");
        let event = InvalidationEvent::binding(&binding);

        assert_eq!(
            event,
            InvalidationEvent::BindingChanged {
                subject_type: BindingSubject::User,
                subject_id: "u1".to_string(),
                target: BindingTarget::Role("r1".to_string()),
            }
        );
        assert_eq!(event.kind(), "binding_changed");
    }

    #[test]
    fn test_event_serialization() {
        let event = InvalidationEvent::UserRoleChanged {
            principal_id: "u1".to_string(),
            role_id: "r1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user_role_changed");
        assert_eq!(json["principal_id"], "u1");
    }
}
