//! ABAC facts consumed by attribute caveats

use super::default_true;
use crate::types::{new_id, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSubject {
    Principal,
    Resource,
    Organization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub subject_id: String,
    pub subject_type: AttributeSubject,
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Attribute {
    pub fn principal(
        subject_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            id: new_id(),
            subject_id: subject_id.into(),
            subject_type: AttributeSubject::Principal,
            key: key.into(),
            value: value.into(),
            organization_id: None,
            expires_at: None,
            is_active: true,
        }
    }

    /// Scope the attribute to one organization's bindings
    pub fn in_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Visible to bindings of `organization_id`; unscoped attributes are
    /// visible everywhere
    pub fn visible_in(&self, organization_id: &str) -> bool {
        self.organization_id.as_deref().map_or(true, |org| org == organization_id)
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Active and not expired at `at`
    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires| at < expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_attribute_effectiveness() {
        let now = Utc::now();
        let attr = Attribute::principal("u1", "clearance", "secret");
        assert!(attr.is_effective(now));

        let expired = attr.clone().expiring_at(now - Duration::seconds(1));
        assert!(!expired.is_effective(now));

        let mut inactive = attr;
        inactive.is_active = false;
        assert!(!inactive.is_effective(now));
    }

    #[test]
    fn test_attribute_visibility() {
        let global = Attribute::principal("u1", "clearance", "secret");
        let scoped = global.clone().in_organization("org-1");

        assert!(global.visible_in("org-2"));
        assert!(scoped.visible_in("org-1"));
        assert!(!scoped.visible_in("org-2"));
    }
}
