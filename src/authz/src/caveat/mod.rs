//! Binding caveats: time windows, attribute requirements and column-group
//! restrictions.
//!
//! Caveats travel as a JSON object:
//!
//! ```json
//! {
//!   "starts_at": "2026-01-01T00:00:00Z",
//!   "ends_at": 1767225600,
//!   "required_attributes": { "clearance": "secret" },
//!   "column_groups": ["pii_basic"]
//! }
//! ```
//!
//! Instants are accepted as RFC 3339 strings or Unix seconds.

pub mod evaluator;

pub use evaluator::{CaveatEvaluator, CaveatOutcome};

use crate::error::{AuthzError, Result};
use crate::types::TimeWindow;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single `(key, expected value)` attribute predicate
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRequirement {
    pub key: String,
    pub expected: Value,
}

/// Constraints attached to a binding, ANDed together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CaveatDocument", into = "CaveatDocument")]
pub struct Caveat {
    pub window: Option<TimeWindow>,
    pub required_attributes: Vec<AttributeRequirement>,
    pub column_groups: Vec<String>,
}

impl Caveat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a caveat from its JSON document form
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AuthzError::Validation(format!("malformed caveat: {}", e)))
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn require_attribute(mut self, key: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.required_attributes.push(AttributeRequirement {
            key: key.into(),
            expected: expected.into(),
        });
        self
    }

    pub fn with_column_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.window.map_or(true, |w| !w.is_bounded())
            && self.required_attributes.is_empty()
            && self.column_groups.is_empty()
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.window.and_then(|w| w.ends_at)
    }
}

/// Wire shape of a caveat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CaveatDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    starts_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ends_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    required_attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    column_groups: Vec<String>,
}

impl TryFrom<CaveatDocument> for Caveat {
    type Error = String;

    fn try_from(doc: CaveatDocument) -> std::result::Result<Self, Self::Error> {
        let starts_at = doc.starts_at.as_ref().map(parse_instant).transpose()?.flatten();
        let ends_at = doc.ends_at.as_ref().map(parse_instant).transpose()?.flatten();

        if let (Some(start), Some(end)) = (starts_at, ends_at) {
            if end < start {
                return Err(format!("ends_at {} precedes starts_at {}", end, start));
            }
        }

        let window = if starts_at.is_some() || ends_at.is_some() {
            Some(TimeWindow { starts_at, ends_at })
        } else {
            None
        };

        Ok(Self {
            window,
            required_attributes: doc
                .required_attributes
                .into_iter()
                .map(|(key, expected)| AttributeRequirement { key, expected })
                .collect(),
            column_groups: doc.column_groups,
        })
    }
}

impl From<Caveat> for CaveatDocument {
    fn from(caveat: Caveat) -> Self {
        let window = caveat.window.unwrap_or_default();
        Self {
            starts_at: window.starts_at.map(|t| Value::String(t.to_rfc3339())),
            ends_at: window.ends_at.map(|t| Value::String(t.to_rfc3339())),
            required_attributes: caveat
                .required_attributes
                .into_iter()
                .map(|req| (req.key, req.expected))
                .collect(),
            column_groups: caveat.column_groups,
        }
    }
}

fn parse_instant(value: &Value) -> std::result::Result<Option<DateTime<Utc>>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| format!("invalid timestamp {:?}: {}", s, e)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(Some)
            .ok_or_else(|| format!("invalid unix timestamp {}", n)),
        other => Err(format!("unsupported timestamp value {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_caveat() {
        let caveat = Caveat::from_json(
            r#"{
                "starts_at": "2026-01-01T00:00:00Z",
                "ends_at": 1798761600,
                "required_attributes": {"clearance": "secret", "level": 3},
                "column_groups": ["pii_basic"]
            }"#,
        )
        .unwrap();

        let window = caveat.window.unwrap();
        assert_eq!(window.starts_at.unwrap().to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(window.ends_at.unwrap().timestamp(), 1_798_761_600);
        assert_eq!(caveat.required_attributes.len(), 2);
        assert_eq!(caveat.column_groups, vec!["pii_basic".to_string()]);
    }

    #[test]
    fn test_decode_empty_caveat() {
        let caveat = Caveat::from_json("{}").unwrap();
        assert!(caveat.is_empty());
        assert!(caveat.window.is_none());
    }

    #[test]
    fn test_malformed_caveat_is_validation_error() {
        assert!(matches!(
            Caveat::from_json(r#"{"ends_at": "yesterday"}"#),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            Caveat::from_json(r#"{"starts_at": 200, "ends_at": 100}"#),
            Err(AuthzError::Validation(_))
        ));
        assert!(Caveat::from_json("not json").is_err());
    }

    #[test]
    fn test_document_shape_survives_serialization() {
        let caveat = Caveat::new()
            .require_attribute("department", "finance")
            .with_column_groups(["salary"]);

        let json = serde_json::to_value(&caveat).unwrap();
        assert_eq!(json["required_attributes"]["department"], "finance");
        assert_eq!(json["column_groups"][0], "salary");
        assert!(json.get("starts_at").is_none());
    }
}
