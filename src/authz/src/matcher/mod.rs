//! Permission matching strategies
//!
//! Each grant model is a [`GrantMatcher`]. The engine ORs every configured
//! matcher, so adding a model means adding a matcher, not touching the
//! engine. Matching is exact on resource type, resource ID and action; the
//! only wildcards are type-level references (Model 1) and the `"*"`
//! resource ID sentinel (Model 2).

pub mod direct;
pub mod named;

pub use direct::DirectResourceGrantMatcher;
pub use named::NamedPermissionMatcher;

use crate::error::Result;
use crate::model::Role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The request being matched
#[derive(Debug, Clone, Copy)]
pub struct GrantRequest<'a> {
    pub resource_type: &'a str,
    pub resource_id: &'a str,
    pub action: &'a str,
}

impl<'a> GrantRequest<'a> {
    pub fn new(resource_type: &'a str, resource_id: &'a str, action: &'a str) -> Self {
        Self {
            resource_type,
            resource_id,
            action,
        }
    }
}

/// Which grant model produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchModel {
    NamedPermission,
    DirectResourceGrant,
}

impl std::fmt::Display for MatchModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchModel::NamedPermission => write!(f, "named permission"),
            MatchModel::DirectResourceGrant => write!(f, "direct resource grant"),
        }
    }
}

/// A successful match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantMatch {
    pub role_id: String,
    pub role_name: String,
    pub model: MatchModel,
    /// Audit string, e.g. `role:editor (named permission)`
    pub matched_via: String,
}

/// A grant model that can decide whether `roles` cover a request
#[async_trait]
pub trait GrantMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// First matching grant among `roles`, if any
    async fn matches(&self, roles: &[Role], request: &GrantRequest<'_>) -> Result<Option<GrantMatch>>;
}
