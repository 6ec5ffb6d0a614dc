//! Evaluation requests and decisions

use crate::hierarchy::{EffectiveRole, EffectiveRoleSet};
use crate::matcher::{GrantMatch, MatchModel};
use crate::types::EvalContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// A single `(principal, resource, action)` question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub principal_id: String,
    pub resource_type: String,
    /// Empty for a type-level request
    #[serde(default)]
    pub resource_id: String,
    pub action: String,
}

impl AccessRequest {
    pub fn new(
        principal_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: action.into(),
        }
    }

    /// First missing required field, if any
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.principal_id.trim().is_empty() {
            Some("principal_id")
        } else if self.resource_type.trim().is_empty() {
            Some("resource_type")
        } else if self.action.trim().is_empty() {
            Some("action")
        } else {
            None
        }
    }
}

/// One entry of a bulk check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCheck {
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: String,
    pub action: String,
}

impl ResourceCheck {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: action.into(),
        }
    }

    /// `type:id:action`, the key bulk results are reported under
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.resource_type, self.resource_id, self.action)
    }
}

/// Role as reported on a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: String,
    pub name: String,
    pub provenance: Vec<String>,
    /// Only held through a caveated binding
    #[serde(default)]
    pub conditional: bool,
}

impl RoleSummary {
    fn from_effective(role: &EffectiveRole, conditional: bool) -> Self {
        Self {
            id: role.role.id.clone(),
            name: role.role.name.clone(),
            provenance: role.provenance.iter().map(ToString::to_string).collect(),
            conditional,
        }
    }

    /// Unconditional roles first, then binding roles not already listed
    pub fn from_set(set: &EffectiveRoleSet) -> Vec<Self> {
        let mut summaries: Vec<Self> = set
            .roles
            .iter()
            .map(|r| Self::from_effective(r, false))
            .collect();
        for grant in &set.conditional {
            for role in &grant.roles {
                if !summaries.iter().any(|s| s.id == role.role.id) {
                    summaries.push(Self::from_effective(role, true));
                }
            }
        }
        summaries
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision ID
    pub id: String,

    pub allowed: bool,

    /// Human-readable justification; never carries backend detail
    pub reason: String,

    /// Matching model and role on ALLOW
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_via: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<MatchModel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_id: Option<String>,

    #[serde(default)]
    pub effective_roles: Vec<RoleSummary>,

    /// Column projection the caller must apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_groups: Vec<String>,

    /// Evaluation steps, for explain output
    #[serde(default)]
    pub trace: Vec<String>,

    #[serde(default)]
    pub cache_hit: bool,

    pub evaluated_at: DateTime<Utc>,

    pub evaluation_duration: Duration,

    /// First instant at which a window behind this decision opens or
    /// closes; bounds how long the decision may be cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Decision {
    fn new(allowed: bool, reason: String, ctx: &EvalContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed,
            reason,
            matched_via: None,
            model: None,
            binding_id: None,
            effective_roles: Vec::new(),
            column_groups: Vec::new(),
            trace: Vec::new(),
            cache_hit: false,
            evaluated_at: ctx.now,
            evaluation_duration: Duration::ZERO,
            valid_until: None,
        }
    }

    /// Create an allow decision from a grant match
    pub fn allow(grant: &GrantMatch, ctx: &EvalContext) -> Self {
        let mut decision = Self::new(
            true,
            format!("granted via role {} ({})", grant.role_name, grant.model),
            ctx,
        );
        decision.matched_via = Some(grant.matched_via.clone());
        decision.model = Some(grant.model);
        decision
    }

    /// Allow through a binding that targets a single permission
    pub fn allow_bound_permission(binding_id: &str, permission_id: &str, ctx: &EvalContext) -> Self {
        let mut decision = Self::new(
            true,
            format!("granted via binding {} (bound permission {})", binding_id, permission_id),
            ctx,
        );
        decision.matched_via = Some(format!("binding:{} (bound permission)", binding_id));
        decision.model = Some(MatchModel::NamedPermission);
        decision
    }

    /// Create a deny decision
    pub fn deny(reason: impl Into<String>, ctx: &EvalContext) -> Self {
        Self::new(false, reason.into(), ctx)
    }

    pub fn with_roles(mut self, set: &EffectiveRoleSet) -> Self {
        self.effective_roles = RoleSummary::from_set(set);
        self
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    pub fn through_binding(mut self, binding_id: &str, column_groups: Vec<String>) -> Self {
        self.binding_id = Some(binding_id.to_string());
        self.column_groups = column_groups;
        self
    }

    pub fn valid_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.valid_until = until;
        self
    }

    pub fn role_ids(&self) -> impl Iterator<Item = &str> {
        self.effective_roles.iter().map(|r| r.id.as_str())
    }
}

/// Results of a bulk check keyed by [`ResourceCheck::key`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkDecision {
    pub principal_id: String,
    pub results: HashMap<String, Decision>,
}

impl BulkDecision {
    pub fn allowed(&self, check: &ResourceCheck) -> bool {
        self.results
            .get(&check.key())
            .map_or(false, |decision| decision.allowed)
    }

    pub fn allowed_count(&self) -> usize {
        self.results.values().filter(|d| d.allowed).count()
    }
}
