//! # Bastion Authorization Engine
//!
//! Decides whether a principal may perform an action on a resource, and
//! explains why.
//!
//! ## Features
//!
//! - **Two grant models**: named permissions linked to roles, and direct
//!   role-to-resource grants with a type-level wildcard
//! - **Hierarchy resolution** across role parentage, group membership and
//!   inheritance, organization defaults and role bindings, terminating on
//!   cyclic data
//! - **Caveats** on bindings: time windows, attribute requirements and
//!   column-group restrictions
//! - **Evaluation cache** with role-dependency invalidation
//! - **Default deny**: every evaluation fails closed
//!
//! ## Example
//!
//! ```rust
//! use bastion_authz::{
//!     DecisionEngine, EngineConfig, EvalContext, InMemoryStore,
//!     model::{ResourcePermission, Role, UserRole},
//!     store::{PermissionStore, RoleStore},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let editor = Role::global("editor");
//!     store.insert_role(editor.clone()).await?;
//!     store.insert_user_role(UserRole::new("alice", &editor.id)).await?;
//!     store
//!         .insert_resource_permission(ResourcePermission::type_level(&editor.id, "document", "edit"))
//!         .await?;
//!
//!     let engine = DecisionEngine::new(EngineConfig::default(), store)?;
//!     let decision = engine
//!         .evaluate("alice", "document", "doc-1", "edit", &EvalContext::new())
//!         .await?;
//!
//!     assert!(decision.allowed);
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod cache;
pub mod caveat;
pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod matcher;
pub mod model;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use admin::AccessAdmin;
pub use cache::{CacheService, EvaluationCache, InMemoryCache};
pub use caveat::{Caveat, CaveatEvaluator, CaveatOutcome};
pub use config::EngineConfig;
pub use engine::{BulkDecision, Decision, DecisionEngine, InvalidationEvent, ResourceCheck};
pub use error::{AuthzError, Result};
pub use hierarchy::{EffectiveRoleSet, HierarchyResolver, Provenance};
pub use matcher::{GrantMatcher, MatchModel};
pub use store::{AccessStore, InMemoryStore, StoreSnapshot};
pub use types::{EvalContext, GroupId, OrganizationId, PermissionId, PrincipalId, RoleId, TimeWindow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
