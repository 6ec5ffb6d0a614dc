//! Core authorization types shared by every component

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique role identifier
pub type RoleId = String;

/// Unique permission identifier
pub type PermissionId = String;

/// Unique principal identifier (user or service)
pub type PrincipalId = String;

/// Unique group identifier
pub type GroupId = String;

/// Unique organization identifier
pub type OrganizationId = String;

/// Sentinel resource ID meaning "every resource of this type"
pub const WILDCARD_RESOURCE_ID: &str = "*";

/// Optional validity bounds shared by memberships, assignments and caveats.
///
/// Both bounds are inclusive; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// A window with no bounds
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self {
            starts_at: Some(starts_at),
            ends_at: Some(ends_at),
        }
    }

    pub fn until(ends_at: DateTime<Utc>) -> Self {
        Self {
            starts_at: None,
            ends_at: Some(ends_at),
        }
    }

    pub fn starting(starts_at: DateTime<Utc>) -> Self {
        Self {
            starts_at: Some(starts_at),
            ends_at: None,
        }
    }

    /// Check whether `at` falls inside the window
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |start| start <= at) && self.ends_at.map_or(true, |end| at <= end)
    }

    pub fn is_bounded(&self) -> bool {
        self.starts_at.is_some() || self.ends_at.is_some()
    }

    /// Earliest instant at or after `now` where `contains` may flip
    pub fn next_transition(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match (self.starts_at, self.ends_at) {
            (Some(start), _) if start > now => Some(start),
            (_, Some(end)) if end >= now => Some(end),
            _ => None,
        }
    }
}

/// Earlier of two optional deadlines, treating `None` as unbounded
pub fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Request-scoped context for a single evaluation.
///
/// Identifiers are expected to be validated by the caller's identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalContext {
    /// Active organization of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,

    /// Group the request is made on behalf of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,

    /// Evaluation instant used for every time check
    pub now: DateTime<Utc>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            organization_id: None,
            group_id: None,
            now: Utc::now(),
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a fresh opaque identifier
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
