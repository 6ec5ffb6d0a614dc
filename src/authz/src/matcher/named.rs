//! Model 1: named permissions linked to roles

use super::{GrantMatch, GrantMatcher, GrantRequest, MatchModel};
use crate::error::Result;
use crate::model::{Permission, Role};
use crate::store::AccessStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct NamedPermissionMatcher {
    store: Arc<dyn AccessStore>,
}

impl NamedPermissionMatcher {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Does `permission` cover the request?
    ///
    /// Inactive permissions and dangling resource or action references never
    /// match.
    pub async fn permission_covers(
        &self,
        permission: &Permission,
        request: &GrantRequest<'_>,
    ) -> Result<bool> {
        if !permission.is_active {
            return Ok(false);
        }
        let (Some(resource_ref), Some(action_ref)) = (&permission.resource_id, &permission.action_id)
        else {
            return Ok(false);
        };

        let Some(action) = self.store.get_action(action_ref).await? else {
            debug!("Permission {} references missing action {}", permission.id, action_ref);
            return Ok(false);
        };
        if action.name != request.action {
            return Ok(false);
        }

        let Some(resource) = self.store.get_resource(resource_ref).await? else {
            debug!("Permission {} references missing resource {}", permission.id, resource_ref);
            return Ok(false);
        };
        Ok(resource.denotes(request.resource_type, request.resource_id))
    }

    /// Check a single permission by ID
    pub async fn permission_id_covers(&self, permission_id: &str, request: &GrantRequest<'_>) -> Result<bool> {
        match self.store.get_permission(permission_id).await? {
            Some(permission) => self.permission_covers(&permission, request).await,
            None => Ok(false),
        }
    }
}

#[async_trait]
impl GrantMatcher for NamedPermissionMatcher {
    fn name(&self) -> &'static str {
        "named_permission"
    }

    async fn matches(&self, roles: &[Role], request: &GrantRequest<'_>) -> Result<Option<GrantMatch>> {
        for role in roles {
            for link in self.store.role_permissions_by_role_id(&role.id).await? {
                if !link.is_active {
                    continue;
                }
                if self.permission_id_covers(&link.permission_id, request).await? {
                    debug!(
                        "Named permission {} on role {} matches {}:{}:{}",
                        link.permission_id, role.name, request.resource_type, request.resource_id, request.action
                    );
                    return Ok(Some(GrantMatch {
                        role_id: role.id.clone(),
                        role_name: role.name.clone(),
                        model: MatchModel::NamedPermission,
                        matched_via: format!("role:{} ({})", role.name, MatchModel::NamedPermission),
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Resource, RolePermission};
    use crate::store::{InMemoryStore, PermissionStore};

    async fn seed(store: &InMemoryStore, resource: Resource, action: &str) -> Permission {
        let action = Action::new(action);
        let permission = Permission::new("perm", &resource, &action);
        store.insert_resource(resource).await.unwrap();
        store.insert_action(action).await.unwrap();
        store.insert_permission(permission.clone()).await.unwrap();
        permission
    }

    #[tokio::test]
    async fn test_type_level_permission_matches_any_id() {
        let store = Arc::new(InMemoryStore::new());
        let permission = seed(&store, Resource::of_type("doc"), "read").await;
        let role = Role::global("reader");
        store
            .insert_role_permission(RolePermission::new(&role.id, &permission.id))
            .await
            .unwrap();

        let matcher = NamedPermissionMatcher::new(store.clone());
        let found = matcher
            .matches(&[role.clone()], &GrantRequest::new("doc", "doc-42", "read"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.matched_via, "role:reader (named permission)");
        assert_eq!(found.model, MatchModel::NamedPermission);

        assert!(matcher
            .matches(&[role.clone()], &GrantRequest::new("doc", "doc-42", "write"))
            .await
            .unwrap()
            .is_none());
        assert!(matcher
            .matches(&[role], &GrantRequest::new("sheet", "doc-42", "read"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_object_permission_requires_exact_id() {
        let store = Arc::new(InMemoryStore::new());
        let permission = seed(&store, Resource::object("doc", "doc-1"), "read").await;
        let role = Role::global("reader");
        store
            .insert_role_permission(RolePermission::new(&role.id, &permission.id))
            .await
            .unwrap();

        let matcher = NamedPermissionMatcher::new(store.clone());
        assert!(matcher
            .matches(&[role.clone()], &GrantRequest::new("doc", "doc-1", "read"))
            .await
            .unwrap()
            .is_some());
        assert!(matcher
            .matches(&[role], &GrantRequest::new("doc", "doc-2", "read"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_inactive_link_and_permission_do_not_match() {
        let store = Arc::new(InMemoryStore::new());
        let permission = seed(&store, Resource::of_type("doc"), "read").await;
        let role = Role::global("reader");
        let mut link = RolePermission::new(&role.id, &permission.id);
        link.is_active = false;
        store.insert_role_permission(link).await.unwrap();

        let matcher = NamedPermissionMatcher::new(store.clone());
        let request = GrantRequest::new("doc", "doc-1", "read");
        assert!(matcher.matches(&[role.clone()], &request).await.unwrap().is_none());

        let mut disabled = permission.clone();
        disabled.is_active = false;
        assert!(!matcher.permission_covers(&disabled, &request).await.unwrap());
        assert!(matcher.permission_covers(&permission, &request).await.unwrap());
    }
}
