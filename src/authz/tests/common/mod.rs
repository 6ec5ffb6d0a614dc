//! Shared fixtures for integration tests

#![allow(dead_code)]

use bastion_authz::engine::InMemoryAuditLog;
use bastion_authz::model::{
    Action, Permission, Resource, ResourcePermission, Role, RolePermission, UserRole,
};
use bastion_authz::store::{PermissionStore, RoleStore};
use bastion_authz::{AccessAdmin, DecisionEngine, EngineConfig, InMemoryStore};
use std::sync::Arc;

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub engine: Arc<DecisionEngine>,
    pub admin: AccessAdmin,
    pub audit: Arc<InMemoryAuditLog>,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

pub fn uncached_fixture() -> Fixture {
    let mut config = EngineConfig::default();
    config.cache.enabled = false;
    fixture_with(config)
}

pub fn fixture_with(config: EngineConfig) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let audit = Arc::new(InMemoryAuditLog::default());
    let engine = Arc::new(
        DecisionEngine::new(config, store.clone())
            .unwrap()
            .with_audit_sink(audit.clone()),
    );
    let admin = AccessAdmin::new(engine.clone());
    Fixture {
        store,
        engine,
        admin,
        audit,
    }
}

/// Insert a global role whose ID equals its name
pub async fn role(store: &InMemoryStore, id: &str, parent: Option<&str>) -> Role {
    let mut role = Role::global(id).with_id(id);
    role.parent_id = parent.map(str::to_string);
    store.insert_role(role.clone()).await.unwrap();
    role
}

pub async fn assign(store: &InMemoryStore, principal_id: &str, role_id: &str) {
    store
        .insert_user_role(UserRole::new(principal_id, role_id))
        .await
        .unwrap();
}

/// Model 1: a named permission on `resource_type` (type-level when
/// `object_id` is `None`) linked to `role_id`
pub async fn named_permission(
    store: &InMemoryStore,
    role_id: &str,
    resource_type: &str,
    object_id: Option<&str>,
    action: &str,
) -> Permission {
    let resource = match object_id {
        Some(object_id) => Resource::object(resource_type, object_id),
        None => Resource::of_type(resource_type),
    };
    let action = Action::new(action);
    let permission = Permission::new(format!("{}:{}", resource_type, action.name), &resource, &action);

    store.insert_resource(resource).await.unwrap();
    store.insert_action(action).await.unwrap();
    store.insert_permission(permission.clone()).await.unwrap();
    store
        .insert_role_permission(RolePermission::new(role_id, &permission.id))
        .await
        .unwrap();
    permission
}

/// Model 2: a direct grant of `action` on one resource, or on every
/// resource of the type when `resource_id` is `"*"`
pub async fn direct_grant(
    store: &InMemoryStore,
    role_id: &str,
    resource_type: &str,
    resource_id: &str,
    action: &str,
) -> ResourcePermission {
    let grant = ResourcePermission::new(role_id, resource_type, resource_id, action);
    store.insert_resource_permission(grant.clone()).await.unwrap();
    grant
}
