//! Model 2: direct role-to-resource grants

use super::{GrantMatch, GrantMatcher, GrantRequest, MatchModel};
use crate::error::Result;
use crate::model::Role;
use crate::store::AccessStore;
use crate::types::RoleId;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct DirectResourceGrantMatcher {
    store: Arc<dyn AccessStore>,
}

impl DirectResourceGrantMatcher {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GrantMatcher for DirectResourceGrantMatcher {
    fn name(&self) -> &'static str {
        "direct_resource_grant"
    }

    async fn matches(&self, roles: &[Role], request: &GrantRequest<'_>) -> Result<Option<GrantMatch>> {
        if roles.is_empty() {
            return Ok(None);
        }
        let role_ids: Vec<RoleId> = roles.iter().map(|r| r.id.clone()).collect();

        let granted = self
            .store
            .check_multiple_permissions(
                &role_ids,
                request.resource_type,
                request.resource_id,
                request.action,
            )
            .await?;
        if !granted {
            return Ok(None);
        }

        let grant = self
            .store
            .find_resource_grant(
                &role_ids,
                request.resource_type,
                request.resource_id,
                request.action,
            )
            .await?;
        let role = grant
            .as_ref()
            .and_then(|g| roles.iter().find(|r| r.id == g.role_id))
            .unwrap_or(&roles[0]);

        debug!(
            "Direct resource grant on role {} matches {}:{}:{}",
            role.name, request.resource_type, request.resource_id, request.action
        );
        Ok(Some(GrantMatch {
            role_id: role.id.clone(),
            role_name: role.name.clone(),
            model: MatchModel::DirectResourceGrant,
            matched_via: MatchModel::DirectResourceGrant.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourcePermission;
    use crate::store::{InMemoryStore, PermissionStore};

    #[tokio::test]
    async fn test_batched_match_reports_granting_role() {
        let store = Arc::new(InMemoryStore::new());
        let viewer = Role::global("viewer");
        let owner = Role::global("owner");
        store
            .insert_resource_permission(ResourcePermission::new(&owner.id, "doc", "doc-7", "delete"))
            .await
            .unwrap();

        let matcher = DirectResourceGrantMatcher::new(store.clone());
        let found = matcher
            .matches(
                &[viewer.clone(), owner.clone()],
                &GrantRequest::new("doc", "doc-7", "delete"),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.role_id, owner.id);
        assert_eq!(found.matched_via, "direct resource grant");
        assert!(matcher
            .matches(&[viewer, owner], &GrantRequest::new("doc", "doc-8", "delete"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_wildcard_grant_matches_concrete_id() {
        let store = Arc::new(InMemoryStore::new());
        let role = Role::global("viewer");
        store
            .insert_resource_permission(ResourcePermission::type_level(&role.id, "doc", "read"))
            .await
            .unwrap();

        let matcher = DirectResourceGrantMatcher::new(store.clone());
        assert!(matcher
            .matches(&[role], &GrantRequest::new("doc", "any-doc", "read"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_no_roles_no_lookup() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let matcher = DirectResourceGrantMatcher::new(store.clone());
        assert!(matcher
            .matches(&[], &GrantRequest::new("doc", "d", "read"))
            .await
            .unwrap()
            .is_none());
    }
}
