//! Administrative mutations
//!
//! [`AccessAdmin`] applies writes to the store and then fires the engine's
//! invalidation hook, so cached role sets and decisions never outlive the
//! rows they were computed from by more than a failed invalidation's TTL.
//! Versioned entities go through the store's conditional writes.

use crate::engine::{DecisionEngine, InvalidationEvent};
use crate::error::{AuthzError, Result};
use crate::hierarchy::{GraphError, RoleGraph, RoleNode};
use crate::model::{
    Attribute, Binding, Group, GroupInheritance, GroupMembership, GroupRole, Permission,
    ResourcePermission, Role, RolePermission, UserRole,
};
use crate::store::AccessStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AccessAdmin {
    store: Arc<dyn AccessStore>,
    engine: Arc<DecisionEngine>,
}

impl AccessAdmin {
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self {
            store: engine.store().clone(),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    // ========================================================================
    // Roles
    // ========================================================================

    pub async fn create_role(&self, role: Role) -> Result<Role> {
        role.validate()?;
        if let Some(parent_id) = &role.parent_id {
            self.check_parent_edge(&role, parent_id).await?;
        }
        self.store.insert_role(role.clone()).await?;
        self.engine
            .invalidate(&InvalidationEvent::RoleChanged {
                role_id: role.id.clone(),
            })
            .await;
        info!("Created role {} ({})", role.name, role.id);
        Ok(role)
    }

    /// Version-checked update; a changed parent is validated first
    pub async fn update_role(&self, role: Role) -> Result<Role> {
        let current = self
            .store
            .get_role(&role.id)
            .await?
            .ok_or_else(|| AuthzError::not_found("role", &role.id))?;
        if role.parent_id != current.parent_id {
            if let Some(parent_id) = &role.parent_id {
                self.check_parent_edge(&role, parent_id).await?;
            }
        }

        let updated = self.store.update_role(role).await?;
        self.engine
            .invalidate(&InvalidationEvent::RoleChanged {
                role_id: updated.id.clone(),
            })
            .await;
        Ok(updated)
    }

    /// Re-parent a role
    ///
    /// Fails with [`AuthzError::CycleOrDepthExceeded`] when the new edge
    /// would close a cycle or push a chain past the depth ceiling.
    pub async fn set_role_parent(
        &self,
        role_id: &str,
        parent_id: Option<&str>,
        expected_version: u64,
    ) -> Result<Role> {
        let mut role = self
            .store
            .get_role(role_id)
            .await?
            .ok_or_else(|| AuthzError::not_found("role", role_id))?;
        role.parent_id = parent_id.map(str::to_string);
        role.version = expected_version;
        self.update_role(role).await
    }

    /// Soft delete
    pub async fn delete_role(&self, role_id: &str, expected_version: u64) -> Result<Role> {
        let deleted = self.store.delete_role(role_id, expected_version).await?;
        self.engine
            .invalidate(&InvalidationEvent::RoleChanged {
                role_id: role_id.to_string(),
            })
            .await;
        info!("Deleted role {}", role_id);
        Ok(deleted)
    }

    /// Forest of live roles for display
    pub async fn role_tree(&self) -> Result<Vec<RoleNode>> {
        Ok(RoleGraph::from_roles(&self.store.list_roles().await?).tree())
    }

    async fn check_parent_edge(&self, role: &Role, parent_id: &str) -> Result<()> {
        let role_id = role.id.as_str();
        let max_depth = self.engine.resolver().max_depth();
        let mut graph_roles = self.store.list_roles().await?;
        if !graph_roles.iter().any(|r| r.id == parent_id && r.is_live()) {
            return Err(AuthzError::not_found("role", parent_id));
        }
        if !graph_roles.iter().any(|r| r.id == role_id) {
            // Not stored yet: no children, and its own parent is the edge under test
            let mut pending = role.clone();
            pending.parent_id = None;
            graph_roles.push(pending);
        }
        let graph = RoleGraph::from_roles(&graph_roles);

        if graph.would_create_cycle(role_id, parent_id) {
            warn!("Rejected parent {} for role {}: cycle", parent_id, role_id);
            return Err(AuthzError::CycleOrDepthExceeded {
                role_id: role_id.to_string(),
                depth: graph.depth_of(parent_id).unwrap_or(0) + 1,
            });
        }

        let depth = graph
            .chain_depth_with_parent(role_id, parent_id)
            .map_err(|e| match e {
                GraphError::CircularDependency(id) => AuthzError::CycleOrDepthExceeded {
                    role_id: id,
                    depth: max_depth + 1,
                },
                GraphError::UnknownRole(id) => AuthzError::not_found("role", id),
            })?;
        if depth > max_depth {
            warn!(
                "Rejected parent {} for role {}: chain depth {} exceeds {}",
                parent_id, role_id, depth, max_depth
            );
            return Err(AuthzError::CycleOrDepthExceeded {
                role_id: role_id.to_string(),
                depth,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Role assignments
    // ========================================================================

    pub async fn assign_role(&self, user_role: UserRole) -> Result<UserRole> {
        self.store.insert_user_role(user_role.clone()).await?;
        self.engine
            .invalidate(&InvalidationEvent::UserRoleChanged {
                principal_id: user_role.principal_id.clone(),
                role_id: user_role.role_id.clone(),
            })
            .await;
        Ok(user_role)
    }

    /// Deactivate every assignment of `role_id` to the principal
    pub async fn revoke_role(&self, principal_id: &str, role_id: &str) -> Result<usize> {
        let revoked = self.store.deactivate_user_role(principal_id, role_id).await?;
        self.engine
            .invalidate(&InvalidationEvent::UserRoleChanged {
                principal_id: principal_id.to_string(),
                role_id: role_id.to_string(),
            })
            .await;
        Ok(revoked)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    pub async fn create_permission(&self, permission: Permission) -> Result<Permission> {
        self.store.insert_permission(permission.clone()).await?;
        Ok(permission)
    }

    pub async fn update_permission(&self, permission: Permission) -> Result<Permission> {
        let updated = self.store.update_permission(permission).await?;
        self.engine
            .invalidate(&InvalidationEvent::PermissionChanged {
                permission_id: updated.id.clone(),
            })
            .await;
        Ok(updated)
    }

    pub async fn link_permission(&self, role_id: &str, permission_id: &str) -> Result<RolePermission> {
        let link = RolePermission::new(role_id, permission_id);
        self.store.insert_role_permission(link.clone()).await?;
        self.role_permission_changed(role_id, permission_id).await;
        Ok(link)
    }

    pub async fn unlink_permission(&self, role_id: &str, permission_id: &str) -> Result<usize> {
        let removed = self
            .store
            .deactivate_role_permission(role_id, permission_id)
            .await?;
        self.role_permission_changed(role_id, permission_id).await;
        Ok(removed)
    }

    async fn role_permission_changed(&self, role_id: &str, permission_id: &str) {
        self.engine
            .invalidate(&InvalidationEvent::RolePermissionChanged {
                role_id: role_id.to_string(),
                permission_id: permission_id.to_string(),
            })
            .await;
    }

    pub async fn grant_resource_permission(&self, grant: ResourcePermission) -> Result<ResourcePermission> {
        self.store.insert_resource_permission(grant.clone()).await?;
        self.engine
            .invalidate(&InvalidationEvent::ResourcePermissionChanged {
                role_id: grant.role_id.clone(),
            })
            .await;
        Ok(grant)
    }

    pub async fn revoke_resource_permission(&self, grant_id: &str) -> Result<ResourcePermission> {
        let revoked = self.store.deactivate_resource_permission(grant_id).await?;
        self.engine
            .invalidate(&InvalidationEvent::ResourcePermissionChanged {
                role_id: revoked.role_id.clone(),
            })
            .await;
        Ok(revoked)
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    pub async fn create_binding(&self, binding: Binding) -> Result<Binding> {
        self.store.insert_binding(binding.clone()).await?;
        self.engine.invalidate(&InvalidationEvent::binding(&binding)).await;
        Ok(binding)
    }

    /// Version-checked update; both the old and new subject and target are
    /// invalidated
    pub async fn update_binding(&self, binding: Binding) -> Result<Binding> {
        let previous = self.store.get_binding(&binding.id).await?;
        let updated = self.store.update_binding(binding).await?;
        if let Some(previous) = previous {
            self.engine.invalidate(&InvalidationEvent::binding(&previous)).await;
        }
        self.engine.invalidate(&InvalidationEvent::binding(&updated)).await;
        Ok(updated)
    }

    pub async fn delete_binding(&self, binding_id: &str, expected_version: u64) -> Result<Binding> {
        let deleted = self.store.delete_binding(binding_id, expected_version).await?;
        self.engine.invalidate(&InvalidationEvent::binding(&deleted)).await;
        Ok(deleted)
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub async fn create_group(&self, group: Group) -> Result<Group> {
        group.validate()?;
        self.store.insert_group(group.clone()).await?;
        Ok(group)
    }

    pub async fn assign_group_role(&self, group_role: GroupRole) -> Result<GroupRole> {
        self.store.insert_group_role(group_role.clone()).await?;
        self.engine
            .invalidate(&InvalidationEvent::GroupRoleChanged {
                group_id: group_role.group_id.clone(),
                role_id: group_role.role_id.clone(),
            })
            .await;
        Ok(group_role)
    }

    pub async fn revoke_group_role(&self, group_id: &str, role_id: &str) -> Result<usize> {
        let revoked = self.store.deactivate_group_role(group_id, role_id).await?;
        self.engine
            .invalidate(&InvalidationEvent::GroupRoleChanged {
                group_id: group_id.to_string(),
                role_id: role_id.to_string(),
            })
            .await;
        Ok(revoked)
    }

    pub async fn add_member(&self, membership: GroupMembership) -> Result<GroupMembership> {
        self.store.insert_membership(membership.clone()).await?;
        self.membership_changed(&membership.group_id, &membership.principal_id)
            .await;
        Ok(membership)
    }

    pub async fn remove_member(&self, group_id: &str, principal_id: &str) -> Result<usize> {
        let removed = self.store.deactivate_membership(group_id, principal_id).await?;
        self.membership_changed(group_id, principal_id).await;
        Ok(removed)
    }

    async fn membership_changed(&self, group_id: &str, principal_id: &str) {
        self.engine
            .invalidate(&InvalidationEvent::GroupMembershipChanged {
                group_id: group_id.to_string(),
                principal_id: principal_id.to_string(),
            })
            .await;
    }

    /// Make `child_group_id` inherit from `parent_group_id`
    ///
    /// Rejects an edge from a group to one of its own descendants.
    pub async fn add_inheritance(&self, edge: GroupInheritance) -> Result<GroupInheritance> {
        let descendants = self
            .engine
            .resolver()
            .group_subtree(&edge.child_group_id)
            .await?;
        if descendants.contains(&edge.parent_group_id) {
            return Err(AuthzError::Validation(format!(
                "group {} already inherits from {}",
                edge.parent_group_id, edge.child_group_id
            )));
        }

        self.store.insert_inheritance(edge.clone()).await?;
        self.engine
            .invalidate(&InvalidationEvent::GroupInheritanceChanged {
                parent_group_id: edge.parent_group_id.clone(),
                child_group_id: edge.child_group_id.clone(),
            })
            .await;
        Ok(edge)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub async fn put_attribute(&self, attribute: Attribute) -> Result<Attribute> {
        self.store.put_attribute(attribute.clone()).await?;
        self.engine
            .invalidate(&InvalidationEvent::AttributeChanged {
                subject_id: attribute.subject_id.clone(),
            })
            .await;
        Ok(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::{InMemoryStore, RoleStore};

    async fn admin_with_store() -> (AccessAdmin, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let engine = DecisionEngine::new(EngineConfig::default(), store.clone()).unwrap();
        (AccessAdmin::new(Arc::new(engine)), store)
    }

    #[tokio::test]
    async fn test_set_parent_rejects_cycle() {
        let (admin, store) = admin_with_store().await;
        let parent = admin.create_role(Role::global("parent")).await.unwrap();
        let child = admin
            .create_role(Role::global("child").with_parent(&parent.id))
            .await
            .unwrap();

        let err = admin
            .set_role_parent(&parent.id, Some(&child.id), parent.version)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::CycleOrDepthExceeded { .. }));

        let stored = store.get_role(&parent.id).await.unwrap().unwrap();
        assert!(stored.parent_id.is_none());
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_set_parent_rejects_self() {
        let (admin, _) = admin_with_store().await;
        let role = admin.create_role(Role::global("solo")).await.unwrap();
        assert!(admin
            .set_role_parent(&role.id, Some(&role.id), role.version)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_parent_rejects_excessive_depth() {
        let (admin, _) = admin_with_store().await;
        let mut previous = admin.create_role(Role::global("level-0")).await.unwrap();
        for i in 1..=8 {
            previous = admin
                .create_role(Role::global(format!("level-{}", i)).with_parent(&previous.id))
                .await
                .unwrap();
        }

        let err = admin
            .create_role(Role::global("level-9").with_parent(&previous.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::CycleOrDepthExceeded { depth: 9, .. }));
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let (admin, _) = admin_with_store().await;
        let role = admin.create_role(Role::global("editor")).await.unwrap();

        admin.update_role(role.clone()).await.unwrap();
        let err = admin.update_role(role).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_role_tree() {
        let (admin, _) = admin_with_store().await;
        let root = admin.create_role(Role::global("root")).await.unwrap();
        admin
            .create_role(Role::global("leaf").with_parent(&root.id))
            .await
            .unwrap();

        let tree = admin.role_tree().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].role.name, "leaf");
    }

    #[tokio::test]
    async fn test_inheritance_cycle_rejected() {
        let (admin, _) = admin_with_store().await;
        let a = admin.create_group(Group::root("a", "org-1")).await.unwrap();
        let b = admin.create_group(Group::root("b", "org-1")).await.unwrap();

        admin
            .add_inheritance(GroupInheritance::new(&a.id, &b.id))
            .await
            .unwrap();
        let err = admin
            .add_inheritance(GroupInheritance::new(&b.id, &a.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Validation(_)));
    }
}
