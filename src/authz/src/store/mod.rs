//! Storage collaborators consumed by the engine
//!
//! Lookups return `Ok(None)` / empty vectors for absent rows; only backend
//! failures surface as [`AuthzError::Store`](crate::error::AuthzError::Store).
//! Versioned updates are conditional writes: a stale `version` yields
//! [`AuthzError::Concurrency`](crate::error::AuthzError::Concurrency) and
//! leaves the stored row untouched.

pub mod memory;

pub use memory::{InMemoryStore, StoreSnapshot};

use crate::error::Result;
use crate::model::{
    Action, Attribute, AttributeSubject, Binding, BindingSubject, BindingTarget, Group,
    GroupInheritance, GroupMembership, GroupRole, Organization, Permission, Resource,
    ResourcePermission, Role, RolePermission, UserRole,
};
use crate::types::RoleId;
use async_trait::async_trait;

/// Roles and direct role assignments
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_role(&self, id: &str) -> Result<Option<Role>>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Live roles flagged as defaults that are global or scoped to `organization_id`
    async fn default_roles(&self, organization_id: &str) -> Result<Vec<Role>>;

    async fn insert_role(&self, role: Role) -> Result<()>;

    /// Conditional write; returns the stored role with its bumped version
    async fn update_role(&self, role: Role) -> Result<Role>;

    /// Soft delete guarded by `expected_version`
    async fn delete_role(&self, id: &str, expected_version: u64) -> Result<Role>;

    async fn user_roles_for(&self, principal_id: &str) -> Result<Vec<UserRole>>;

    async fn insert_user_role(&self, user_role: UserRole) -> Result<()>;

    /// Deactivate every assignment of `role_id` to `principal_id`
    async fn deactivate_user_role(&self, principal_id: &str, role_id: &str) -> Result<usize>;
}

/// Named permissions (Model 1) and direct resource grants (Model 2)
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_permission(&self, id: &str) -> Result<Option<Permission>>;

    async fn insert_permission(&self, permission: Permission) -> Result<()>;

    async fn update_permission(&self, permission: Permission) -> Result<Permission>;

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>>;

    async fn insert_resource(&self, resource: Resource) -> Result<()>;

    async fn get_action(&self, id: &str) -> Result<Option<Action>>;

    async fn insert_action(&self, action: Action) -> Result<()>;

    async fn role_permissions_by_role_id(&self, role_id: &str) -> Result<Vec<RolePermission>>;

    async fn role_permissions_by_permission_id(
        &self,
        permission_id: &str,
    ) -> Result<Vec<RolePermission>>;

    async fn insert_role_permission(&self, link: RolePermission) -> Result<()>;

    async fn deactivate_role_permission(&self, role_id: &str, permission_id: &str) -> Result<usize>;

    async fn resource_permissions_by_role_id(&self, role_id: &str) -> Result<Vec<ResourcePermission>>;

    async fn insert_resource_permission(&self, grant: ResourcePermission) -> Result<()>;

    /// Deactivate a grant, returning it so callers can invalidate its role
    async fn deactivate_resource_permission(&self, id: &str) -> Result<ResourcePermission>;

    /// One batched Model 2 check across `role_ids`; wildcard rows match any ID
    async fn check_multiple_permissions(
        &self,
        role_ids: &[RoleId],
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<bool>;

    /// First grant satisfying the same predicate as `check_multiple_permissions`
    async fn find_resource_grant(
        &self,
        role_ids: &[RoleId],
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<Option<ResourcePermission>>;
}

/// Groups, memberships, inheritance edges and group roles
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_group(&self, id: &str) -> Result<Option<Group>>;

    async fn insert_group(&self, group: Group) -> Result<()>;

    async fn memberships_for_principal(&self, principal_id: &str) -> Result<Vec<GroupMembership>>;

    async fn members_of_group(&self, group_id: &str) -> Result<Vec<GroupMembership>>;

    async fn insert_membership(&self, membership: GroupMembership) -> Result<()>;

    async fn deactivate_membership(&self, group_id: &str, principal_id: &str) -> Result<usize>;

    async fn group_roles_for(&self, group_id: &str) -> Result<Vec<GroupRole>>;

    async fn insert_group_role(&self, group_role: GroupRole) -> Result<()>;

    async fn deactivate_group_role(&self, group_id: &str, role_id: &str) -> Result<usize>;

    /// Edges whose child is `group_id`
    async fn inheritance_parents(&self, group_id: &str) -> Result<Vec<GroupInheritance>>;

    /// Edges whose parent is `group_id`
    async fn inheritance_children(&self, group_id: &str) -> Result<Vec<GroupInheritance>>;

    async fn insert_inheritance(&self, edge: GroupInheritance) -> Result<()>;

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>>;

    async fn insert_organization(&self, organization: Organization) -> Result<()>;
}

#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn get_binding(&self, id: &str) -> Result<Option<Binding>>;

    async fn bindings_for_subject(
        &self,
        subject_type: BindingSubject,
        subject_id: &str,
    ) -> Result<Vec<Binding>>;

    async fn bindings_for_target(&self, target: &BindingTarget) -> Result<Vec<Binding>>;

    async fn insert_binding(&self, binding: Binding) -> Result<()>;

    async fn update_binding(&self, binding: Binding) -> Result<Binding>;

    async fn delete_binding(&self, id: &str, expected_version: u64) -> Result<Binding>;
}

#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn attributes_for(
        &self,
        subject_id: &str,
        subject_type: AttributeSubject,
    ) -> Result<Vec<Attribute>>;

    /// Upsert keyed by subject, key and organization scope
    async fn put_attribute(&self, attribute: Attribute) -> Result<()>;
}

/// Every collaborator the engine reads from
pub trait AccessStore: RoleStore + PermissionStore + GroupStore + BindingStore + AttributeStore {}

impl<T> AccessStore for T where
    T: RoleStore + PermissionStore + GroupStore + BindingStore + AttributeStore
{
}
