//! In-memory reference store
//!
//! Backs tests, the CLI and benchmarks. All collections live behind one
//! `tokio::sync::RwLock`, so every conditional write is atomic with respect
//! to concurrent readers.

use super::{AttributeStore, BindingStore, GroupStore, PermissionStore, RoleStore};
use crate::error::{AuthzError, Result};
use crate::model::{
    Action, Attribute, AttributeSubject, Binding, BindingSubject, BindingTarget, Group,
    GroupInheritance, GroupMembership, GroupRole, Organization, Permission, Resource,
    ResourcePermission, Role, RolePermission, UserRole,
};
use crate::types::RoleId;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Serializable dump of every collection, used for JSON fixtures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub organizations: Vec<Organization>,
    pub roles: Vec<Role>,
    pub user_roles: Vec<UserRole>,
    pub resources: Vec<Resource>,
    pub actions: Vec<Action>,
    pub permissions: Vec<Permission>,
    pub role_permissions: Vec<RolePermission>,
    pub resource_permissions: Vec<ResourcePermission>,
    pub groups: Vec<Group>,
    pub memberships: Vec<GroupMembership>,
    pub inheritance: Vec<GroupInheritance>,
    pub group_roles: Vec<GroupRole>,
    pub bindings: Vec<Binding>,
    pub attributes: Vec<Attribute>,
}

#[derive(Default)]
struct StoreState {
    organizations: HashMap<String, Organization>,
    roles: HashMap<String, Role>,
    user_roles: Vec<UserRole>,
    resources: HashMap<String, Resource>,
    actions: HashMap<String, Action>,
    permissions: HashMap<String, Permission>,
    role_permissions: Vec<RolePermission>,
    resource_permissions: Vec<ResourcePermission>,
    groups: HashMap<String, Group>,
    memberships: Vec<GroupMembership>,
    inheritance: Vec<GroupInheritance>,
    group_roles: Vec<GroupRole>,
    bindings: HashMap<String, Binding>,
    attributes: Vec<Attribute>,
}

/// In-memory implementation of every store trait
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, validating roles and groups
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        for role in &snapshot.roles {
            role.validate()?;
        }
        for group in &snapshot.groups {
            group.validate()?;
        }

        let state = StoreState {
            organizations: snapshot
                .organizations
                .into_iter()
                .map(|o| (o.id.clone(), o))
                .collect(),
            roles: snapshot.roles.into_iter().map(|r| (r.id.clone(), r)).collect(),
            user_roles: snapshot.user_roles,
            resources: snapshot
                .resources
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
            actions: snapshot.actions.into_iter().map(|a| (a.id.clone(), a)).collect(),
            permissions: snapshot
                .permissions
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            role_permissions: snapshot.role_permissions,
            resource_permissions: snapshot.resource_permissions,
            groups: snapshot.groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
            memberships: snapshot.memberships,
            inheritance: snapshot.inheritance,
            group_roles: snapshot.group_roles,
            bindings: snapshot
                .bindings
                .into_iter()
                .map(|b| (b.id.clone(), b))
                .collect(),
            attributes: snapshot.attributes,
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            unavailable: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Load a JSON snapshot from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        Self::from_snapshot(snapshot)
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        StoreSnapshot {
            organizations: state.organizations.values().cloned().collect(),
            roles: state.roles.values().cloned().collect(),
            user_roles: state.user_roles.clone(),
            resources: state.resources.values().cloned().collect(),
            actions: state.actions.values().cloned().collect(),
            permissions: state.permissions.values().cloned().collect(),
            role_permissions: state.role_permissions.clone(),
            resource_permissions: state.resource_permissions.clone(),
            groups: state.groups.values().cloned().collect(),
            memberships: state.memberships.clone(),
            inheritance: state.inheritance.clone(),
            group_roles: state.group_roles.clone(),
            bindings: state.bindings.values().cloned().collect(),
            attributes: state.attributes.clone(),
        }
    }

    /// Simulate a backend outage: every call fails with a store error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthzError::Store("backend unavailable".to_string()));
        }
        Ok(self.state.read().await)
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthzError::Store("backend unavailable".to_string()));
        }
        Ok(self.state.write().await)
    }
}

fn check_version(entity: &'static str, id: &str, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(AuthzError::Concurrency {
            entity,
            id: id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        Ok(self.read().await?.roles.get(id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self.read().await?.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(roles)
    }

    async fn default_roles(&self, organization_id: &str) -> Result<Vec<Role>> {
        let state = self.read().await?;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.is_default && r.is_live() && r.visible_in(organization_id))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(roles)
    }

    async fn insert_role(&self, role: Role) -> Result<()> {
        role.validate()?;
        let mut state = self.write().await?;
        if state.roles.contains_key(&role.id) {
            return Err(AuthzError::Validation(format!("role {} already exists", role.id)));
        }
        state.roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn update_role(&self, role: Role) -> Result<Role> {
        role.validate()?;
        let mut state = self.write().await?;
        let stored = state
            .roles
            .get_mut(&role.id)
            .ok_or_else(|| AuthzError::not_found("role", &role.id))?;
        check_version("role", &role.id, role.version, stored.version)?;

        let mut updated = role;
        updated.version = stored.version + 1;
        *stored = updated.clone();
        debug!("Role {} updated to version {}", updated.id, updated.version);
        Ok(updated)
    }

    async fn delete_role(&self, id: &str, expected_version: u64) -> Result<Role> {
        let mut state = self.write().await?;
        let stored = state
            .roles
            .get_mut(id)
            .ok_or_else(|| AuthzError::not_found("role", id))?;
        check_version("role", id, expected_version, stored.version)?;

        stored.is_active = false;
        stored.deleted_at = Some(Utc::now());
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn user_roles_for(&self, principal_id: &str) -> Result<Vec<UserRole>> {
        Ok(self
            .read()
            .await?
            .user_roles
            .iter()
            .filter(|ur| ur.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn insert_user_role(&self, user_role: UserRole) -> Result<()> {
        self.write().await?.user_roles.push(user_role);
        Ok(())
    }

    async fn deactivate_user_role(&self, principal_id: &str, role_id: &str) -> Result<usize> {
        let mut state = self.write().await?;
        let mut affected = 0;
        for ur in state
            .user_roles
            .iter_mut()
            .filter(|ur| ur.is_active && ur.principal_id == principal_id && ur.role_id == role_id)
        {
            ur.is_active = false;
            affected += 1;
        }
        Ok(affected)
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn get_permission(&self, id: &str) -> Result<Option<Permission>> {
        Ok(self.read().await?.permissions.get(id).cloned())
    }

    async fn insert_permission(&self, permission: Permission) -> Result<()> {
        self.write()
            .await?
            .permissions
            .insert(permission.id.clone(), permission);
        Ok(())
    }

    async fn update_permission(&self, permission: Permission) -> Result<Permission> {
        let mut state = self.write().await?;
        let stored = state
            .permissions
            .get_mut(&permission.id)
            .ok_or_else(|| AuthzError::not_found("permission", &permission.id))?;
        check_version("permission", &permission.id, permission.version, stored.version)?;

        let mut updated = permission;
        updated.version = stored.version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        Ok(self.read().await?.resources.get(id).cloned())
    }

    async fn insert_resource(&self, resource: Resource) -> Result<()> {
        self.write().await?.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    async fn get_action(&self, id: &str) -> Result<Option<Action>> {
        Ok(self.read().await?.actions.get(id).cloned())
    }

    async fn insert_action(&self, action: Action) -> Result<()> {
        self.write().await?.actions.insert(action.id.clone(), action);
        Ok(())
    }

    async fn role_permissions_by_role_id(&self, role_id: &str) -> Result<Vec<RolePermission>> {
        Ok(self
            .read()
            .await?
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn role_permissions_by_permission_id(
        &self,
        permission_id: &str,
    ) -> Result<Vec<RolePermission>> {
        Ok(self
            .read()
            .await?
            .role_permissions
            .iter()
            .filter(|rp| rp.permission_id == permission_id)
            .cloned()
            .collect())
    }

    async fn insert_role_permission(&self, link: RolePermission) -> Result<()> {
        self.write().await?.role_permissions.push(link);
        Ok(())
    }

    async fn deactivate_role_permission(&self, role_id: &str, permission_id: &str) -> Result<usize> {
        let mut state = self.write().await?;
        let mut affected = 0;
        for rp in state.role_permissions.iter_mut().filter(|rp| {
            rp.is_active && rp.role_id == role_id && rp.permission_id == permission_id
        }) {
            rp.is_active = false;
            affected += 1;
        }
        Ok(affected)
    }

    async fn resource_permissions_by_role_id(&self, role_id: &str) -> Result<Vec<ResourcePermission>> {
        Ok(self
            .read()
            .await?
            .resource_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn insert_resource_permission(&self, grant: ResourcePermission) -> Result<()> {
        self.write().await?.resource_permissions.push(grant);
        Ok(())
    }

    async fn deactivate_resource_permission(&self, id: &str) -> Result<ResourcePermission> {
        let mut state = self.write().await?;
        let grant = state
            .resource_permissions
            .iter_mut()
            .find(|rp| rp.id == id)
            .ok_or_else(|| AuthzError::not_found("resource permission", id))?;
        grant.is_active = false;
        Ok(grant.clone())
    }

    async fn check_multiple_permissions(
        &self,
        role_ids: &[RoleId],
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<bool> {
        Ok(self
            .find_resource_grant(role_ids, resource_type, resource_id, action)
            .await?
            .is_some())
    }

    async fn find_resource_grant(
        &self,
        role_ids: &[RoleId],
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<Option<ResourcePermission>> {
        let state = self.read().await?;
        Ok(state
            .resource_permissions
            .iter()
            .filter(|rp| role_ids.contains(&rp.role_id))
            .find(|rp| rp.covers(resource_type, resource_id, action))
            .cloned())
    }
}

#[async_trait]
impl GroupStore for InMemoryStore {
    async fn get_group(&self, id: &str) -> Result<Option<Group>> {
        Ok(self.read().await?.groups.get(id).cloned())
    }

    async fn insert_group(&self, group: Group) -> Result<()> {
        group.validate()?;
        self.write().await?.groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn memberships_for_principal(&self, principal_id: &str) -> Result<Vec<GroupMembership>> {
        Ok(self
            .read()
            .await?
            .memberships
            .iter()
            .filter(|m| m.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn members_of_group(&self, group_id: &str) -> Result<Vec<GroupMembership>> {
        Ok(self
            .read()
            .await?
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn insert_membership(&self, membership: GroupMembership) -> Result<()> {
        self.write().await?.memberships.push(membership);
        Ok(())
    }

    async fn deactivate_membership(&self, group_id: &str, principal_id: &str) -> Result<usize> {
        let mut state = self.write().await?;
        let mut affected = 0;
        for m in state
            .memberships
            .iter_mut()
            .filter(|m| m.is_active && m.group_id == group_id && m.principal_id == principal_id)
        {
            m.is_active = false;
            affected += 1;
        }
        Ok(affected)
    }

    async fn group_roles_for(&self, group_id: &str) -> Result<Vec<GroupRole>> {
        Ok(self
            .read()
            .await?
            .group_roles
            .iter()
            .filter(|gr| gr.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn insert_group_role(&self, group_role: GroupRole) -> Result<()> {
        self.write().await?.group_roles.push(group_role);
        Ok(())
    }

    async fn deactivate_group_role(&self, group_id: &str, role_id: &str) -> Result<usize> {
        let mut state = self.write().await?;
        let mut affected = 0;
        for gr in state
            .group_roles
            .iter_mut()
            .filter(|gr| gr.is_active && gr.group_id == group_id && gr.role_id == role_id)
        {
            gr.is_active = false;
            affected += 1;
        }
        Ok(affected)
    }

    async fn inheritance_parents(&self, group_id: &str) -> Result<Vec<GroupInheritance>> {
        Ok(self
            .read()
            .await?
            .inheritance
            .iter()
            .filter(|e| e.child_group_id == group_id)
            .cloned()
            .collect())
    }

    async fn inheritance_children(&self, group_id: &str) -> Result<Vec<GroupInheritance>> {
        Ok(self
            .read()
            .await?
            .inheritance
            .iter()
            .filter(|e| e.parent_group_id == group_id)
            .cloned()
            .collect())
    }

    async fn insert_inheritance(&self, edge: GroupInheritance) -> Result<()> {
        if edge.parent_group_id == edge.child_group_id {
            return Err(AuthzError::Validation(format!(
                "group {} cannot inherit from itself",
                edge.child_group_id
            )));
        }
        self.write().await?.inheritance.push(edge);
        Ok(())
    }

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        Ok(self.read().await?.organizations.get(id).cloned())
    }

    async fn insert_organization(&self, organization: Organization) -> Result<()> {
        self.write()
            .await?
            .organizations
            .insert(organization.id.clone(), organization);
        Ok(())
    }
}

#[async_trait]
impl BindingStore for InMemoryStore {
    async fn get_binding(&self, id: &str) -> Result<Option<Binding>> {
        Ok(self.read().await?.bindings.get(id).cloned())
    }

    async fn bindings_for_subject(
        &self,
        subject_type: BindingSubject,
        subject_id: &str,
    ) -> Result<Vec<Binding>> {
        let state = self.read().await?;
        let mut bindings: Vec<Binding> = state
            .bindings
            .values()
            .filter(|b| b.subject_type == subject_type && b.subject_id == subject_id)
            .cloned()
            .collect();
        bindings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(bindings)
    }

    async fn bindings_for_target(&self, target: &BindingTarget) -> Result<Vec<Binding>> {
        let state = self.read().await?;
        let mut bindings: Vec<Binding> = state
            .bindings
            .values()
            .filter(|b| &b.target == target)
            .cloned()
            .collect();
        bindings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(bindings)
    }

    async fn insert_binding(&self, binding: Binding) -> Result<()> {
        self.write().await?.bindings.insert(binding.id.clone(), binding);
        Ok(())
    }

    async fn update_binding(&self, binding: Binding) -> Result<Binding> {
        let mut state = self.write().await?;
        let stored = state
            .bindings
            .get_mut(&binding.id)
            .ok_or_else(|| AuthzError::not_found("binding", &binding.id))?;
        check_version("binding", &binding.id, binding.version, stored.version)?;

        let mut updated = binding;
        updated.version = stored.version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_binding(&self, id: &str, expected_version: u64) -> Result<Binding> {
        let mut state = self.write().await?;
        let stored = state
            .bindings
            .get_mut(id)
            .ok_or_else(|| AuthzError::not_found("binding", id))?;
        check_version("binding", id, expected_version, stored.version)?;

        stored.is_active = false;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[async_trait]
impl AttributeStore for InMemoryStore {
    async fn attributes_for(
        &self,
        subject_id: &str,
        subject_type: AttributeSubject,
    ) -> Result<Vec<Attribute>> {
        Ok(self
            .read()
            .await?
            .attributes
            .iter()
            .filter(|a| a.subject_id == subject_id && a.subject_type == subject_type)
            .cloned()
            .collect())
    }

    async fn put_attribute(&self, attribute: Attribute) -> Result<()> {
        let mut state = self.write().await?;
        state.attributes.retain(|a| {
            !(a.subject_id == attribute.subject_id
                && a.subject_type == attribute.subject_type
                && a.key == attribute.key
                && a.organization_id == attribute.organization_id)
        });
        state.attributes.push(attribute);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_role_update_bumps_version() {
        let store = InMemoryStore::new();
        let role = Role::global("editor");
        store.insert_role(role.clone()).await.unwrap();

        let mut edit = role.clone();
        edit.description = "can edit".to_string();
        let updated = store.update_role(edit).await.unwrap();
        assert_eq!(updated.version, 2);

        let stored = store.get_role(&role.id).await.unwrap().unwrap();
        assert_eq!(stored.description, "can edit");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = InMemoryStore::new();
        let role = Role::global("editor");
        store.insert_role(role.clone()).await.unwrap();

        let mut first = role.clone();
        first.description = "first".to_string();
        store.update_role(first).await.unwrap();

        let mut stale = role.clone();
        stale.description = "second".to_string();
        let err = store.update_role(stale).await.unwrap_err();
        assert!(matches!(
            err,
            AuthzError::Concurrency { expected: 1, actual: 2, .. }
        ));

        let stored = store.get_role(&role.id).await.unwrap().unwrap();
        assert_eq!(stored.description, "first");
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_row() {
        let store = InMemoryStore::new();
        let role = Role::global("temp");
        store.insert_role(role.clone()).await.unwrap();

        let deleted = store.delete_role(&role.id, 1).await.unwrap();
        assert!(!deleted.is_live());
        assert!(deleted.deleted_at.is_some());
        assert!(store.get_role(&role.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batched_grant_lookup_honours_wildcard() {
        let store = InMemoryStore::new();
        store
            .insert_resource_permission(ResourcePermission::type_level("r2", "doc", "read"))
            .await
            .unwrap();

        let roles = vec!["r1".to_string(), "r2".to_string()];
        assert!(store
            .check_multiple_permissions(&roles, "doc", "doc-9", "read")
            .await
            .unwrap());
        assert!(!store
            .check_multiple_permissions(&roles, "doc", "doc-9", "write")
            .await
            .unwrap());
        assert!(!store
            .check_multiple_permissions(&["r1".to_string()], "doc", "doc-9", "read")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_attribute_upsert_is_per_organization() {
        let store = InMemoryStore::new();
        store.put_attribute(Attribute::principal("u1", "tier", "gold")).await.unwrap();
        store
            .put_attribute(Attribute::principal("u1", "tier", "silver").in_organization("org-1"))
            .await
            .unwrap();
        store
            .put_attribute(Attribute::principal("u1", "tier", "bronze").in_organization("org-1"))
            .await
            .unwrap();

        let attributes = store.attributes_for("u1", AttributeSubject::Principal).await.unwrap();
        assert_eq!(attributes.len(), 2);
        assert!(attributes.iter().any(|a| a.organization_id.is_none() && a.value == "gold"));
        assert!(attributes
            .iter()
            .any(|a| a.organization_id.as_deref() == Some("org-1") && a.value == "bronze"));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_role("anything").await,
            Err(AuthzError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_json() {
        let store = InMemoryStore::new();
        store.insert_role(Role::global("viewer")).await.unwrap();

        let json = serde_json::to_string(&store.snapshot().await).unwrap();
        let restored = InMemoryStore::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.list_roles().await.unwrap().len(), 1);
    }
}
