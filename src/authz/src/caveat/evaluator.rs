//! Caveat evaluation for binding-mediated grants
//!
//! Every check fails closed: a missing attribute or an instant outside the
//! window rejects the grant. Column groups are not evaluated here; they are
//! returned so the query layer can apply the projection.
//!
//! Attribute caveats see the principal's unscoped attributes plus those
//! scoped to the binding's organization. When both carry the same key the
//! organization-scoped value wins.

use super::{AttributeRequirement, Caveat};
use crate::error::Result;
use crate::model::{Attribute, AttributeSubject, Binding};
use crate::store::AccessStore;
use crate::types::{earliest, EvalContext, TimeWindow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of evaluating a binding's caveat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaveatOutcome {
    pub passed: bool,
    pub reason: String,
    /// Column groups the grant is restricted to, if any
    pub column_groups: Vec<String>,
    /// Earliest expiry among the attributes the caveat relied on
    pub valid_until: Option<DateTime<Utc>>,
}

impl CaveatOutcome {
    fn pass(reason: impl Into<String>, column_groups: Vec<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            column_groups,
            valid_until: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            column_groups: Vec::new(),
            valid_until: None,
        }
    }
}

pub struct CaveatEvaluator {
    store: Arc<dyn AccessStore>,
}

impl CaveatEvaluator {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Evaluate `binding`'s caveat for `principal_id` at `ctx.now`
    pub async fn evaluate(
        &self,
        binding: &Binding,
        principal_id: &str,
        ctx: &EvalContext,
    ) -> Result<CaveatOutcome> {
        let Some(caveat) = &binding.caveat else {
            return Ok(CaveatOutcome::pass("no caveats to evaluate", Vec::new()));
        };

        if let Some(window) = &caveat.window {
            if let Err(reason) = check_window(window, ctx.now) {
                debug!("Binding {} time caveat failed: {}", binding.id, reason);
                return Ok(CaveatOutcome::fail(reason));
            }
        }

        let mut valid_until = None;
        if !caveat.required_attributes.is_empty() {
            let provided = self
                .principal_attributes(principal_id, &binding.organization_id, ctx.now)
                .await?;
            match check_attributes(&caveat.required_attributes, &provided) {
                Ok(expires_at) => valid_until = expires_at,
                Err(reason) => {
                    debug!("Binding {} attribute caveat failed: {}", binding.id, reason);
                    return Ok(CaveatOutcome::fail(reason));
                }
            }
        }

        let mut outcome = CaveatOutcome::pass(describe_pass(caveat), caveat.column_groups.clone());
        outcome.valid_until = valid_until;
        Ok(outcome)
    }

    /// Effective attributes visible to a binding in `organization_id`, one
    /// per key
    async fn principal_attributes(
        &self,
        principal_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, Attribute>> {
        let mut attributes: Vec<Attribute> = self
            .store
            .attributes_for(principal_id, AttributeSubject::Principal)
            .await?
            .into_iter()
            .filter(|a| a.is_effective(now) && a.visible_in(organization_id))
            .collect();
        // Unscoped first so scoped values overwrite them; ID order within a scope
        attributes.sort_by(|a, b| {
            (a.organization_id.is_some(), &a.id).cmp(&(b.organization_id.is_some(), &b.id))
        });

        Ok(attributes.into_iter().map(|a| (a.key.clone(), a)).collect())
    }
}

fn check_window(window: &TimeWindow, now: DateTime<Utc>) -> std::result::Result<(), String> {
    if let Some(start) = window.starts_at {
        if now < start {
            return Err(format!("access not yet active (starts at {})", start.to_rfc3339()));
        }
    }
    if let Some(end) = window.ends_at {
        if now > end {
            return Err(format!("access expired (ended at {})", end.to_rfc3339()));
        }
    }
    Ok(())
}

/// Earliest expiry among the matched attributes on success
fn check_attributes(
    required: &[AttributeRequirement],
    provided: &HashMap<String, Attribute>,
) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let mut expires_at = None;
    for requirement in required {
        match provided.get(&requirement.key) {
            None => return Err(format!("missing required attribute: {}", requirement.key)),
            Some(actual) if !values_match(&requirement.expected, &actual.value) => {
                return Err(format!("attribute mismatch: {}", requirement.key))
            }
            Some(actual) => expires_at = earliest(expires_at, actual.expires_at),
        }
    }
    Ok(expires_at)
}

/// JSON equality, falling back to comparing rendered scalars (`"5"` == `5`)
fn values_match(expected: &Value, actual: &Value) -> bool {
    expected == actual || render(expected) == render(actual)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe_pass(caveat: &Caveat) -> String {
    let mut satisfied = Vec::new();
    if caveat.window.is_some() {
        satisfied.push("time window");
    }
    if !caveat.required_attributes.is_empty() {
        satisfied.push("required attributes");
    }
    if satisfied.is_empty() {
        "no caveats to evaluate".to_string()
    } else {
        format!("caveats satisfied: {}", satisfied.join(", "))
    }
}
